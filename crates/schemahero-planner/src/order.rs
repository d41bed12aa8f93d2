use std::collections::{BTreeSet, HashMap};

use schemahero_core::error::SchemaHeroError;
use schemahero_core::models::{DatabaseExtension, Function, Table, View};

/// A schema object that may depend on others being created first.
pub trait Requires {
    /// Name other objects refer to in `requires`.
    fn sql_name(&self) -> &str;
    fn requires(&self) -> &[String];
}

impl Requires for Table {
    fn sql_name(&self) -> &str {
        &self.spec.name
    }

    fn requires(&self) -> &[String] {
        &self.spec.requires
    }
}

macro_rules! impl_requires {
    ($($ty:ty),*) => {
        $(impl Requires for $ty {
            fn sql_name(&self) -> &str {
                &self.spec.name
            }

            fn requires(&self) -> &[String] {
                &self.spec.requires
            }
        })*
    };
}

impl_requires!(View, Function, DatabaseExtension);

/// Topological order over `requires`, ties broken by name.
///
/// Requirements naming objects outside `items` are assumed to exist already.
/// A cycle is a configuration error.
pub fn order_by_requires<T: Requires>(items: Vec<T>) -> Result<Vec<T>, SchemaHeroError> {
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        by_name.entry(item.sql_name()).or_default().push(i);
    }

    let mut indegree = vec![0usize; items.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    for (i, item) in items.iter().enumerate() {
        for required in item.requires() {
            for &dep in by_name.get(required.as_str()).into_iter().flatten() {
                if dep == i {
                    continue;
                }
                indegree[i] += 1;
                dependents[dep].push(i);
            }
        }
    }

    let mut ready: BTreeSet<(&str, usize)> = items
        .iter()
        .enumerate()
        .filter(|(i, _)| indegree[*i] == 0)
        .map(|(i, item)| (item.sql_name(), i))
        .collect();
    let mut order = Vec::with_capacity(items.len());
    while let Some(next) = ready.pop_first() {
        let (_, i) = next;
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert((items[d].sql_name(), d));
            }
        }
    }

    if order.len() < items.len() {
        let mut stuck: Vec<&str> = items
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, item)| item.sql_name())
            .collect();
        stuck.sort_unstable();
        return Err(SchemaHeroError::Config {
            message: format!("requires cycle between {}", stuck.join(", ")),
        });
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
