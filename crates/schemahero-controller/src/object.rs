use std::marker::PhantomData;

use async_trait::async_trait;

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{Database, DatabaseExtension, Function, View};
use schemahero_planner::{Plannable, Planner};

use crate::runtime::{Action, Reconciler};
use crate::table::MISSING_DATABASE_REQUEUE;
use crate::ManagedDatabases;

/// Plans views, functions and extensions. Same pipeline as tables, never batched.
pub struct ObjectReconciler<T> {
    planner: Planner,
    managed: ManagedDatabases,
    name: &'static str,
    _kind: PhantomData<fn() -> T>,
}

impl<T> ObjectReconciler<T> {
    fn with_name(planner: Planner, managed: ManagedDatabases, name: &'static str) -> Self {
        Self {
            planner,
            managed,
            name,
            _kind: PhantomData,
        }
    }
}

impl ObjectReconciler<View> {
    pub fn views(planner: Planner, managed: ManagedDatabases) -> Self {
        Self::with_name(planner, managed, "view")
    }
}

impl ObjectReconciler<Function> {
    pub fn functions(planner: Planner, managed: ManagedDatabases) -> Self {
        Self::with_name(planner, managed, "function")
    }
}

impl ObjectReconciler<DatabaseExtension> {
    pub fn extensions(planner: Planner, managed: ManagedDatabases) -> Self {
        Self::with_name(planner, managed, "extension")
    }
}

#[async_trait]
impl<T: Plannable> Reconciler for ObjectReconciler<T> {
    type Object = T;

    fn name(&self) -> &'static str {
        self.name
    }

    fn owns(&self, obj: &T) -> bool {
        self.managed.contains(obj.database_name())
    }

    async fn reconcile(&self, obj: T) -> Result<Action, SchemaHeroError> {
        let result = self.converge(&obj).await;
        surface_error(&self.planner, &obj, &result).await;
        result
    }
}

impl<T: Plannable> ObjectReconciler<T> {
    async fn converge(&self, obj: &T) -> Result<Action, SchemaHeroError> {
        let sha = obj.spec_sha()?;
        if obj.last_planned_sha() == Some(sha.as_str()) {
            return Ok(Action::Done);
        }
        let Some(database) = self
            .planner
            .client()
            .get::<Database>(obj.namespace(), obj.database_name())
            .await?
        else {
            return Ok(Action::RequeueAfter(MISSING_DATABASE_REQUEUE));
        };
        self.planner.plan_object(obj, &database).await?;
        Ok(Action::Done)
    }
}

/// Write a terminal reconcile failure to the object's status, since nothing
/// requeues it. A later success clears it.
pub(crate) async fn surface_error<T: Plannable>(
    planner: &Planner,
    obj: &T,
    result: &Result<Action, SchemaHeroError>,
) {
    let error = match result {
        Err(e) if e.kind().is_retryable() => return,
        Err(e) => Some(e),
        Ok(_) if obj.last_error().is_none() => return,
        Ok(_) => None,
    };
    if let Err(e) = planner.record_error(obj, error).await {
        tracing::warn!(kind = T::KIND, namespace = %obj.namespace(), name = %obj.name(), error = %e, "could not update status");
    }
}
