//! Index of objects that are exported at their own sub-frame instant.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use scenesync_scene_model::{ObjectRef, SceneSource};

static EMPTY_BUCKET: BTreeSet<ObjectRef> = BTreeSet::new();

/// Offset within a render frame at which objects of `division` are exported.
///
/// Always in `[0, 1)`: division `1` (once per frame) sits on the render frame
/// itself, and from `2` up higher divisions map to earlier instants.
pub fn subframe_offset(division: u32) -> f64 {
    match division {
        0 | 1 => 0.0,
        d => 1.0 / d as f64,
    }
}

/// Objects grouped by sub-frame division, iterated highest division first.
///
/// Division `0` objects are not stored in buckets; they are kept as the
/// "regular" list and follow the global motion-blur schedule. An object is
/// in at most one bucket at a time.
#[derive(Debug, Clone, Default)]
pub struct SubframeIndex {
    buckets: BTreeMap<Reverse<u32>, BTreeSet<ObjectRef>>,
    divisions: HashMap<ObjectRef, u32>,
    regular: Vec<ObjectRef>,
    built_for_frame: Option<i32>,
    dirty: bool,
}

impl SubframeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index contents by scanning every object in the scene.
    ///
    /// Non-renderable objects are skipped entirely.
    pub fn rebuild(&mut self, scene: &dyn SceneSource) {
        self.buckets.clear();
        self.divisions.clear();
        self.regular.clear();

        for object in scene.objects() {
            if !scene.is_renderable(&object) {
                continue;
            }
            match scene.subframe_division(&object) {
                0 => self.regular.push(object),
                division => self.insert(object, division),
            }
        }
        self.dirty = false;

        tracing::debug!(
            regular = self.regular.len(),
            with_subframes = self.divisions.len(),
            divisions = ?self.all_divisions(),
            "Sub-frame index rebuilt"
        );
    }

    /// Rebuild only if the global frame changed or the topology was marked dirty.
    ///
    /// Returns whether a rebuild happened.
    pub fn refresh(&mut self, frame: i32, scene: &dyn SceneSource) -> bool {
        if !self.dirty && self.built_for_frame == Some(frame) {
            return false;
        }
        self.rebuild(scene);
        self.built_for_frame = Some(frame);
        true
    }

    /// Force the next [`refresh`](Self::refresh) to rescan the scene.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Register `object` at `division`, moving it out of any previous bucket.
    /// Division `0` just removes it from the buckets.
    pub fn insert(&mut self, object: ObjectRef, division: u32) {
        self.remove(&object);
        if division == 0 {
            return;
        }
        self.buckets
            .entry(Reverse(division))
            .or_default()
            .insert(object.clone());
        self.divisions.insert(object, division);
    }

    /// Drop `object` from its bucket, returning the division it was in.
    pub fn remove(&mut self, object: &ObjectRef) -> Option<u32> {
        let division = self.divisions.remove(object)?;
        if let Some(bucket) = self.buckets.get_mut(&Reverse(division)) {
            bucket.remove(object);
            if bucket.is_empty() {
                self.buckets.remove(&Reverse(division));
            }
        }
        Some(division)
    }

    /// Objects registered at exactly `division`.
    pub fn objects_at_division(&self, division: u32) -> &BTreeSet<ObjectRef> {
        self.buckets
            .get(&Reverse(division))
            .unwrap_or(&EMPTY_BUCKET)
    }

    /// Distinct divisions, highest first.
    pub fn all_divisions(&self) -> Vec<u32> {
        self.buckets.keys().map(|Reverse(d)| *d).collect()
    }

    /// Division of `object`, `0` if it follows the global schedule.
    pub fn division_of(&self, object: &ObjectRef) -> u32 {
        self.divisions.get(object).copied().unwrap_or(0)
    }

    /// Renderable objects with no sub-frame override, in traversal order.
    pub fn regular_objects(&self) -> &[ObjectRef] {
        &self.regular
    }

    /// Number of objects with a sub-frame override.
    pub fn len(&self) -> usize {
        self.divisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.divisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenesync_scene_model::CameraRef;

    struct Fixture(Vec<(&'static str, u32, bool)>);

    impl SceneSource for Fixture {
        fn objects(&self) -> Vec<ObjectRef> {
            self.0.iter().map(|(n, _, _)| ObjectRef::new(*n)).collect()
        }
        fn subframe_division(&self, object: &ObjectRef) -> u32 {
            self.0
                .iter()
                .find(|(n, _, _)| *n == object.name())
                .map(|(_, d, _)| *d)
                .unwrap_or(0)
        }
        fn is_renderable(&self, object: &ObjectRef) -> bool {
            self.0
                .iter()
                .any(|(n, _, r)| *n == object.name() && *r)
        }
        fn loop_cameras(&self) -> Vec<CameraRef> {
            vec![]
        }
    }

    fn fixture() -> Fixture {
        Fixture(vec![
            ("Ground", 0, true),
            ("Fan", 4, true),
            ("Wheel", 2, true),
            ("Blade", 4, true),
            ("Ghost", 8, false),
        ])
    }

    #[test]
    fn test_rebuild_groups_by_division_descending() {
        let mut index = SubframeIndex::new();
        index.rebuild(&fixture());

        assert_eq!(index.all_divisions(), vec![4, 2]);
        assert_eq!(index.objects_at_division(4).len(), 2);
        assert!(index
            .objects_at_division(2)
            .contains(&ObjectRef::new("Wheel")));
        assert_eq!(index.regular_objects(), &[ObjectRef::new("Ground")]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_unknown_division_is_empty() {
        let index = SubframeIndex::new();
        assert!(index.objects_at_division(3).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_moves_object_between_buckets() {
        let mut index = SubframeIndex::new();
        index.rebuild(&fixture());

        index.insert(ObjectRef::new("Wheel"), 4);
        assert_eq!(index.all_divisions(), vec![4]);
        assert_eq!(index.division_of(&ObjectRef::new("Wheel")), 4);
        assert_eq!(index.objects_at_division(4).len(), 3);

        index.insert(ObjectRef::new("Fan"), 0);
        assert_eq!(index.division_of(&ObjectRef::new("Fan")), 0);
        assert_eq!(index.objects_at_division(4).len(), 2);
    }

    #[test]
    fn test_refresh_caches_per_frame() {
        let mut index = SubframeIndex::new();
        let scene = fixture();

        assert!(index.refresh(1, &scene));
        assert!(!index.refresh(1, &scene));
        assert!(index.refresh(2, &scene));

        index.mark_dirty();
        assert!(index.refresh(2, &scene));
        assert!(!index.refresh(2, &scene));
    }

    #[test]
    fn test_subframe_offsets_shrink_with_division() {
        assert_eq!(subframe_offset(0), 0.0);
        assert_eq!(subframe_offset(2), 0.5);
        assert!(subframe_offset(4) < subframe_offset(2));
    }

    #[test]
    fn test_subframe_offsets_stay_inside_the_frame() {
        assert_eq!(subframe_offset(1), 0.0);
        for division in 0..64 {
            let offset = subframe_offset(division);
            assert!((0.0..1.0).contains(&offset), "division {division}: {offset}");
        }
    }
}
