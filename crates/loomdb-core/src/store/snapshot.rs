use crate::{
    entity::Entity,
    error::Error,
    store::{Index, Store, TxReport},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Snapshot
///
/// The persisted store layout handed to a session-persistence adaptor.
/// Round-tripping a snapshot through `Store::restore` yields an equal store.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: BTreeMap<String, BTreeMap<String, Entity>>,
    pub versions: BTreeMap<String, BTreeMap<String, u64>>,
    pub type_by_id: BTreeMap<String, String>,
    pub basis_t: u64,
    pub tx_log: Vec<TxReport>,
}

impl Store {
    /// Capture the persisted shape of this store.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let index = self.index();
        Snapshot {
            entities: index.entities.clone(),
            versions: index.versions.clone(),
            type_by_id: index.type_by_id.clone(),
            basis_t: self.basis_t(),
            tx_log: self.tx_log().to_vec(),
        }
    }

    /// Replace this store's state from a snapshot, validating the index
    /// invariants and rebuilding the search index.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), Error> {
        for (ty, bucket) in &snapshot.entities {
            for (id, entity) in bucket {
                if entity.id() != id || entity.ty() != ty {
                    return Err(Error::internal(format!(
                        "snapshot entity '{id}' is filed under mismatched keys"
                    )));
                }
                if snapshot.type_by_id.get(id).map(String::as_str) != Some(ty.as_str()) {
                    return Err(Error::internal(format!(
                        "snapshot type index disagrees for entity '{id}'"
                    )));
                }
                entity.assert_flat()?;
            }
        }
        for (id, ty) in &snapshot.type_by_id {
            let present = snapshot
                .entities
                .get(ty)
                .is_some_and(|bucket| bucket.contains_key(id));
            if !present {
                return Err(Error::internal(format!(
                    "snapshot type index names missing entity '{id}'"
                )));
            }
        }

        self.install(
            Index {
                entities: snapshot.entities,
                versions: snapshot.versions,
                type_by_id: snapshot.type_by_id,
            },
            snapshot.basis_t,
            snapshot.tx_log,
        );
        Ok(())
    }
}

///
/// TESTS
///
