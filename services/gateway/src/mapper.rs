//! Bijective mapping between external camera ids and internal device paths.
//!
//! Clients only ever see `cameraN`; internal code addresses devices by path
//! (`/dev/videoN`).  Both directions are O(1).  External ids are assigned in
//! device-appearance order starting at zero; ids freed by a disappearance go
//! to an ordered pool and are reused lowest-first, so a quickly re-enumerated
//! device usually gets its old id back.
//!
//! Writers are the camera notifier only; every request that touches a device
//! field reads.  The two maps are mutated under one lock so readers never
//! observe a torn pair.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// Parse a canonical external id (`camera0`, `camera12`, ...).
///
/// Rejects non-canonical spellings such as `camera01` so the mapping stays
/// bijective on strings, not just on numbers.
pub fn parse_external_id(s: &str) -> Option<u32> {
    let digits = s.strip_prefix("camera")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    if format!("camera{n}") == s { Some(n) } else { None }
}

fn external_id(n: u32) -> String {
    format!("camera{n}")
}

#[derive(Default)]
struct MapperInner {
    by_path: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
    next_id: u32,
    free_ids: BTreeSet<u32>,
}

/// External-id <-> device-path registry.
#[derive(Default)]
pub struct CameraIdMapper {
    inner: RwLock<MapperInner>,
}

impl CameraIdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// External id for a device path, if the device is currently mapped.
    pub fn external_for(&self, path: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_path.get(path).map(|&n| external_id(n))
    }

    /// Device path for an external id, if the id names a mapped device.
    pub fn path_for(&self, id: &str) -> Option<String> {
        let n = parse_external_id(id)?;
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_id.get(&n).cloned()
    }

    /// True when `id` is canonical and currently mapped.
    pub fn contains_external(&self, id: &str) -> bool {
        self.path_for(id).is_some()
    }

    /// Record a device appearance, assigning (or returning) its external id.
    ///
    /// Idempotent for an already-mapped path.
    pub fn device_added(&self, path: &str) -> String {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&n) = inner.by_path.get(path) {
            return external_id(n);
        }
        let n = match inner.free_ids.pop_first() {
            Some(reclaimed) => reclaimed,
            None => {
                let fresh = inner.next_id;
                inner.next_id += 1;
                fresh
            }
        };
        inner.by_path.insert(path.to_owned(), n);
        inner.by_id.insert(n, path.to_owned());
        external_id(n)
    }

    /// Record a device disappearance, freeing its external id for reuse.
    ///
    /// Returns the id the device held, or `None` for an unmapped path.
    pub fn device_removed(&self, path: &str) -> Option<String> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let n = inner.by_path.remove(path)?;
        inner.by_id.remove(&n);
        inner.free_ids.insert(n);
        Some(external_id(n))
    }

    /// Number of currently-mapped devices.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of (external id, device path) pairs, ordered by id.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut pairs: Vec<(u32, String)> = inner
            .by_id
            .iter()
            .map(|(&n, path)| (n, path.clone()))
            .collect();
        pairs.sort_by_key(|(n, _)| *n);
        pairs
            .into_iter()
            .map(|(n, path)| (external_id(n), path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_appearance_order_from_zero() {
        let mapper = CameraIdMapper::new();
        assert_eq!(mapper.device_added("/dev/video0"), "camera0");
        assert_eq!(mapper.device_added("/dev/video2"), "camera1");
        assert_eq!(mapper.device_added("/dev/video7"), "camera2");
    }

    #[test]
    fn lookups_are_bijective_while_mapped() {
        let mapper = CameraIdMapper::new();
        mapper.device_added("/dev/video0");
        mapper.device_added("/dev/video1");

        for id in ["camera0", "camera1"] {
            let path = mapper.path_for(id).expect("id should resolve");
            assert_eq!(mapper.external_for(&path).as_deref(), Some(id));
        }
        assert_eq!(mapper.external_for("/dev/video9"), None);
        assert_eq!(mapper.path_for("camera9"), None);
    }

    #[test]
    fn device_added_is_idempotent() {
        let mapper = CameraIdMapper::new();
        assert_eq!(mapper.device_added("/dev/video0"), "camera0");
        assert_eq!(mapper.device_added("/dev/video0"), "camera0");
        assert_eq!(mapper.len(), 1);
    }

    #[test]
    fn freed_ids_are_reused_lowest_first() {
        let mapper = CameraIdMapper::new();
        mapper.device_added("/dev/video0"); // camera0
        mapper.device_added("/dev/video1"); // camera1
        mapper.device_added("/dev/video2"); // camera2

        assert_eq!(mapper.device_removed("/dev/video1").as_deref(), Some("camera1"));
        assert_eq!(mapper.device_removed("/dev/video0").as_deref(), Some("camera0"));

        // Lowest freed id first, then the next one; only then fresh ids.
        assert_eq!(mapper.device_added("/dev/video5"), "camera0");
        assert_eq!(mapper.device_added("/dev/video6"), "camera1");
        assert_eq!(mapper.device_added("/dev/video7"), "camera3");
    }

    #[test]
    fn removal_of_unknown_path_is_a_noop() {
        let mapper = CameraIdMapper::new();
        assert_eq!(mapper.device_removed("/dev/video0"), None);
        assert!(mapper.is_empty());
    }

    #[test]
    fn non_canonical_ids_are_rejected() {
        let mapper = CameraIdMapper::new();
        mapper.device_added("/dev/video0");
        mapper.device_added("/dev/video1");

        assert_eq!(parse_external_id("camera1"), Some(1));
        assert_eq!(parse_external_id("camera01"), None);
        assert_eq!(parse_external_id("camera"), None);
        assert_eq!(parse_external_id("camera-1"), None);
        assert_eq!(parse_external_id("video0"), None);
        assert_eq!(mapper.path_for("camera01"), None);
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let mapper = CameraIdMapper::new();
        mapper.device_added("/dev/video3");
        mapper.device_added("/dev/video1");
        let snap = mapper.snapshot();
        assert_eq!(
            snap,
            vec![
                ("camera0".to_owned(), "/dev/video3".to_owned()),
                ("camera1".to_owned(), "/dev/video1".to_owned()),
            ]
        );
    }
}
