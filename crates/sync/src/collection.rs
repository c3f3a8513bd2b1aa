use reel_codec::Entity;
use std::sync::Arc;
use tokio::sync::watch;

/// Result of merging a batch into a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entities that took the place of a member with the same identity.
    pub replaced: usize,
    /// Entities appended at the end.
    pub appended: usize,
}

/// Ordered list of entities mirrored to observers.
///
/// Every mutation notifies subscribers (see [`subscribe`](Self::subscribe)),
/// even when it turns out to change nothing. Cheap to clone; clones share the
/// same list.
#[derive(Debug)]
pub struct ObservableCollection<E> {
    items: Arc<watch::Sender<Vec<E>>>,
}
impl<E> Clone for ObservableCollection<E> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}
impl<E: Entity + Clone> Default for ObservableCollection<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E: Entity + Clone> ObservableCollection<E> {
    pub fn new(items: Vec<E>) -> Self {
        Self {
            items: Arc::new(watch::Sender::new(items)),
        }
    }

    /// Snapshot of the current members, in order.
    pub fn items(&self) -> Vec<E> {
        self.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<E> {
        self.items.borrow().get(index).cloned()
    }

    pub fn last(&self) -> Option<E> {
        self.items.borrow().last().cloned()
    }

    /// Position of the member sharing `item`'s identity. Entities without an
    /// identity are never found.
    pub fn index_of(&self, item: &E) -> Option<usize> {
        self.items.borrow().iter().position(|member| member.same_identity(item))
    }

    /// Whether `item` shares its identity with the last member.
    pub fn is_last(&self, item: &E) -> bool {
        self.items.borrow().last().is_some_and(|last| last.same_identity(item))
    }

    /// Overwrite the member at `index`. Out-of-range indexes change nothing.
    /// Returns whether a member was overwritten.
    pub fn set(&self, index: usize, item: E) -> bool {
        let mut replaced = false;
        self.items.send_modify(|items| {
            if let Some(slot) = items.get_mut(index) {
                *slot = item;
                replaced = true;
            }
        });
        replaced
    }

    pub fn append(&self, item: E) {
        self.items.send_modify(|items| items.push(item));
    }

    /// Append every item, without looking at identities.
    pub fn append_all(&self, new: impl IntoIterator<Item = E>) {
        self.items.send_modify(|items| items.extend(new));
    }

    /// Insert `item` at `index`, or at the end if `index` is past it.
    pub fn insert(&self, index: usize, item: E) {
        self.items.send_modify(|items| {
            let index = index.min(items.len());
            items.insert(index, item);
        });
    }

    /// Remove every member sharing `item`'s identity. Returns how many were
    /// removed.
    pub fn remove(&self, item: &E) -> usize {
        let mut removed = 0;
        self.items.send_modify(|items| {
            let before = items.len();
            items.retain(|member| !member.same_identity(item));
            removed = before - items.len();
        });
        removed
    }

    /// Put `item` in place of the member sharing its identity, keeping its
    /// position. Returns `false` (and changes nothing) if there is no such
    /// member.
    pub fn replace(&self, item: E) -> bool {
        let mut replaced = false;
        self.items.send_modify(|items| {
            if let Some(slot) = items.iter_mut().find(|member| member.same_identity(&item)) {
                *slot = item;
                replaced = true;
            }
        });
        replaced
    }

    /// Apply `change` to the member sharing `item`'s identity and return the
    /// changed member.
    pub fn update(&self, item: &E, change: impl FnOnce(&mut E)) -> Option<E> {
        let mut updated = None;
        self.items.send_modify(|items| {
            if let Some(member) = items.iter_mut().find(|member| member.same_identity(item)) {
                change(member);
                updated = Some(member.clone());
            }
        });
        updated
    }

    /// Merge a batch by identity.
    ///
    /// An entity sharing its identity with a member takes that member's place
    /// (same index); any other entity is appended, in batch order. Afterwards
    /// no two members with an identity share it.
    pub fn merge(&self, batch: impl IntoIterator<Item = E>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        self.items.send_modify(|items| {
            for entity in batch {
                match items.iter().position(|member| member.same_identity(&entity)) {
                    Some(index) => {
                        items[index] = entity;
                        outcome.replaced += 1;
                    },
                    None => {
                        items.push(entity);
                        outcome.appended += 1;
                    },
                }
            }
        });
        outcome
    }

    pub fn clear(&self) {
        self.items.send_modify(Vec::clear);
    }

    /// Receiver that observes every change to the list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<E>> {
        self.items.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Movie;

    fn movie(id: i64, title: &str) -> Movie {
        Movie {
            id: Some(id),
            title: title.to_string(),
            ..Movie::default()
        }
    }

    fn titles(collection: &ObservableCollection<Movie>) -> Vec<String> {
        collection.items().into_iter().map(|m| m.title).collect()
    }

    #[test]
    fn test_merge_without_overlap_appends_in_order() {
        let collection = ObservableCollection::new(vec![movie(1, "a")]);
        let outcome = collection.merge([movie(2, "b"), movie(3, "c")]);
        assert_eq!(outcome, MergeOutcome { replaced: 0, appended: 2 });
        assert_eq!(titles(&collection), ["a", "b", "c"]);
    }

    #[test]
    fn test_merge_overlap_keeps_position() {
        let collection = ObservableCollection::new(vec![movie(1, "a"), movie(2, "b"), movie(3, "c")]);
        let outcome = collection.merge([movie(2, "b2")]);
        assert_eq!(outcome, MergeOutcome { replaced: 1, appended: 0 });
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.index_of(&movie(2, "")), Some(1));
        assert_eq!(titles(&collection), ["a", "b2", "c"]);
    }

    #[test]
    fn test_merge_deduplicates_within_batch() {
        let collection = ObservableCollection::default();
        collection.merge([movie(1, "first"), movie(2, "b"), movie(1, "second")]);
        assert_eq!(titles(&collection), ["second", "b"]);
    }

    #[test]
    fn test_merge_never_matches_missing_identity() {
        let collection = ObservableCollection::new(vec![Movie::default()]);
        collection.merge([Movie::default()]);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.index_of(&Movie::default()), None);
    }

    #[test]
    fn test_positional_operations() {
        let collection = ObservableCollection::default();
        collection.append(movie(1, "a"));
        collection.append_all([movie(3, "c")]);
        collection.insert(1, movie(2, "b"));
        collection.insert(99, movie(4, "d"));
        assert_eq!(titles(&collection), ["a", "b", "c", "d"]);
        assert!(collection.set(0, movie(1, "A")));
        assert!(!collection.set(10, movie(9, "z")));
        assert_eq!(collection.get(0).map(|m| m.title), Some("A".to_string()));
        assert_eq!(collection.get(10), None);
        assert!(collection.is_last(&movie(4, "")));
        assert!(!collection.is_last(&movie(3, "")));
        assert_eq!(collection.remove(&movie(2, "")), 1);
        assert_eq!(collection.remove(&movie(2, "")), 0);
        assert_eq!(titles(&collection), ["A", "c", "d"]);
        assert!(collection.replace(movie(3, "C")));
        assert!(!collection.replace(movie(8, "h")));
        assert_eq!(titles(&collection), ["A", "C", "d"]);
        let updated = collection.update(&movie(3, ""), |m| m.vote_count = 12);
        assert_eq!(updated.map(|m| (m.title, m.vote_count)), Some(("C".to_string(), 12)));
        assert_eq!(collection.update(&movie(8, ""), |m| m.vote_count = 1), None);
        collection.clear();
        assert!(collection.is_empty());
        assert_eq!(collection.last(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_every_mutation() {
        let collection = ObservableCollection::default();
        let mut receiver = collection.subscribe();
        assert!(!receiver.has_changed().unwrap());
        collection.merge([movie(1, "a")]);
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().len(), 1);
        // A no-op mutation still notifies.
        collection.replace(movie(5, "missing"));
        assert!(receiver.has_changed().unwrap());
    }
}
