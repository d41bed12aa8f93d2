/// SQL statements for the resource store schema.

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

pub const CREATE_RESOURCES: &str = "
CREATE TABLE IF NOT EXISTS resources (
    kind                TEXT NOT NULL,
    namespace           TEXT NOT NULL,
    name                TEXT NOT NULL,
    uid                 TEXT NOT NULL UNIQUE,
    resource_version    INTEGER NOT NULL,
    document            TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    PRIMARY KEY (kind, namespace, name)
)";

pub const CREATE_OWNER_REFERENCES: &str = "
CREATE TABLE IF NOT EXISTS owner_references (
    owner_uid       TEXT NOT NULL,
    dependent_uid   TEXT NOT NULL,
    PRIMARY KEY (owner_uid, dependent_uid),
    FOREIGN KEY (dependent_uid) REFERENCES resources(uid) ON DELETE CASCADE
)";

pub const CREATE_RESOURCE_VERSION_COUNTER: &str = "
CREATE TABLE IF NOT EXISTS resource_version_counter (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    value   INTEGER NOT NULL
)";

pub const SEED_RESOURCE_VERSION_COUNTER: &str = "
INSERT OR IGNORE INTO resource_version_counter (id, value) VALUES (1, 0)";

pub const CREATE_KIND_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_resources_kind_namespace ON resources (kind, namespace)";
