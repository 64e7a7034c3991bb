//! Join engine — combines independent fetch results into composite views.
//!
//! The join is a single-pass bucket build over the child collection
//! followed by an attach pass over the parent collection, so it runs in
//! O(parents + children). Output order always follows parent fetch order,
//! never child completion order.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::Entity;

/// A parent entity annotated with its matching children, in child fetch order.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<P, C> {
    pub parent: P,
    pub children: Vec<C>,
}

/// Join invariant violations.
///
/// These indicate malformed upstream data, not transport problems; the
/// aggregator surfaces them as internal failures rather than dropping the
/// offending records silently.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("child entity {child_id:?} has no foreign key and cannot be joined")]
    MissingForeignKey { child_id: String },
}

/// Attaches each child to the parent its foreign key references.
///
/// Every parent appears exactly once in the output, in its original
/// position, with an empty child list when nothing matched. Children whose
/// foreign key matches no parent are dropped from the composites (raw
/// listings still carry them). A child with a missing or empty foreign key
/// is an invariant violation.
///
/// # Examples
///
/// ```
/// use viewgate::join::join_by_foreign_key;
/// use viewgate::model::{sample_orders, sample_users};
///
/// let composites = join_by_foreign_key(&sample_users(), &sample_orders()).unwrap();
/// assert_eq!(composites.len(), 3);
/// assert_eq!(composites[0].children.len(), 2); // user "1" owns O1 and O2
/// ```
pub fn join_by_foreign_key<P, C>(parents: &[P], children: &[C]) -> Result<Vec<Joined<P, C>>, JoinError>
where
    P: Entity,
    C: Entity,
{
    let mut buckets: HashMap<&str, Vec<C>> = HashMap::with_capacity(parents.len());
    for child in children {
        let fk = match child.foreign_key() {
            Some(fk) if !fk.is_empty() => fk,
            _ => {
                return Err(JoinError::MissingForeignKey {
                    child_id: child.id().to_owned(),
                });
            }
        };
        buckets.entry(fk).or_default().push(child.clone());
    }

    // Attach buckets in parent order; unclaimed buckets are orphans and fall away.
    Ok(parents
        .iter()
        .map(|parent| Joined {
            parent: parent.clone(),
            children: buckets.remove(parent.id()).unwrap_or_default(),
        })
        .collect())
}
