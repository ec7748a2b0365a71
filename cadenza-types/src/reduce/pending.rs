//! Generic fold rules shared by every entity kind.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::{
    AudioNode, KeyPatch, LayerPatch, MusicKey, MusicLayer, NodePatch, Pending,
};

/// An entity that can absorb a partial update in place.
pub(crate) trait Amend<P> {
    fn amend(&mut self, patch: &P);
}

/// A partial update that can absorb a newer partial update.
pub(crate) trait Coalesce {
    fn coalesce(&mut self, newer: &Self);
}

impl Amend<NodePatch> for AudioNode {
    fn amend(&mut self, patch: &NodePatch) {
        self.apply(patch);
    }
}

impl Amend<LayerPatch> for MusicLayer {
    fn amend(&mut self, patch: &LayerPatch) {
        self.apply(patch);
    }
}

impl Amend<KeyPatch> for MusicKey {
    fn amend(&mut self, patch: &KeyPatch) {
        self.apply(patch);
    }
}

impl Coalesce for NodePatch {
    fn coalesce(&mut self, newer: &Self) {
        self.merge(newer);
    }
}

impl Coalesce for LayerPatch {
    fn coalesce(&mut self, newer: &Self) {
        self.merge(newer);
    }
}

impl Coalesce for KeyPatch {
    fn coalesce(&mut self, newer: &Self) {
        self.merge(newer);
    }
}

/// A create always replaces whatever was pending for the id.
pub(crate) fn fold_create<K, T, P>(map: &mut BTreeMap<K, Pending<T, P>>, kind: &str, id: K, entity: T)
where
    K: Ord + Copy + Display,
{
    if let Some(Pending::Update(_)) = map.get(&id) {
        log::error!(
            target: "types::reduce",
            "{} {}: create after a pending update is not a valid transition",
            kind,
            id
        );
    }
    map.insert(id, Pending::Create(entity));
}

/// An update amends a pending create in place, merges into a pending update,
/// or starts a new pending update.
pub(crate) fn fold_update<K, T, P>(map: &mut BTreeMap<K, Pending<T, P>>, kind: &str, id: K, patch: &P)
where
    K: Ord + Copy + Display,
    T: Amend<P>,
    P: Coalesce + Clone,
{
    match map.get_mut(&id) {
        Some(Pending::Create(entity)) => entity.amend(patch),
        Some(Pending::Update(pending)) => pending.coalesce(patch),
        Some(Pending::Remove) => {
            log::warn!(target: "types::reduce", "{} {}: ignoring update after remove", kind, id);
        }
        None => {
            map.insert(id, Pending::Update(patch.clone()));
        }
    }
}

/// A remove always wins, discarding any earlier pending create or update.
pub(crate) fn fold_remove<K, T, P>(map: &mut BTreeMap<K, Pending<T, P>>, id: K)
where
    K: Ord,
{
    map.insert(id, Pending::Remove);
}

/// Re-apply a newer pending operation on top of an older summary's entry.
pub(crate) fn fold_pending<K, T, P>(map: &mut BTreeMap<K, Pending<T, P>>, kind: &str, id: K, newer: Pending<T, P>)
where
    K: Ord + Copy + Display,
    T: Amend<P>,
    P: Coalesce + Clone,
{
    match newer {
        Pending::Create(entity) => fold_create(map, kind, id, entity),
        Pending::Update(patch) => fold_update(map, kind, id, &patch),
        Pending::Remove => fold_remove(map, id),
    }
}
