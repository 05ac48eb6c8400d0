//! Per-chunk visibility and detail-distance flags
//!
//! Downstream LOD/streaming code only reacts to transitions, so every record
//! carries a dirty flag that is set on the evaluation where one of its two
//! booleans changed and cleared on the next one.

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use crate::render::frustum::{Aabb, extract_frustum_planes};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibilityRecord {
    pub bounds: Aabb,
    pub is_visible: bool,
    pub is_at_distance: bool,
    pub is_dirty: bool,
}

impl VisibilityRecord {
    pub fn new(bounds: Aabb) -> Self {
        VisibilityRecord {
            bounds,
            is_visible: false,
            is_at_distance: false,
            is_dirty: false,
        }
    }

    fn evaluate(&mut self, view: &FrustumView) {
        let visible = self.bounds.intersects_frustum(&view.planes);
        let at_distance = if visible {
            self.bounds.center().distance_squared(view.camera_position) > view.detail_distance_sq
        } else {
            self.is_at_distance
        };

        self.is_dirty = visible != self.is_visible || at_distance != self.is_at_distance;
        self.is_visible = visible;
        self.is_at_distance = at_distance;
    }
}

/// Camera state for one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct FrustumView {
    pub planes: [Vec4; 6],
    pub camera_position: Vec3,
    pub detail_distance_sq: f32,
}

impl FrustumView {
    pub fn new(view_proj: &Mat4, camera_position: Vec3, detail_distance: f32) -> Self {
        FrustumView {
            planes: extract_frustum_planes(view_proj),
            camera_position,
            detail_distance_sq: detail_distance * detail_distance,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VisibilityCuller {
    records: Vec<VisibilityRecord>,
}

impl VisibilityCuller {
    pub fn new(bounds: impl IntoIterator<Item = Aabb>) -> Self {
        VisibilityCuller {
            records: bounds.into_iter().map(VisibilityRecord::new).collect(),
        }
    }

    pub fn records(&self) -> &[VisibilityRecord] {
        &self.records
    }

    pub fn update(&mut self, view: &FrustumView) {
        self.records
            .par_iter_mut()
            .for_each(|record| record.evaluate(view));
    }

    /// Indices of records whose flags changed in the last update.
    pub fn dirty(&self) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_dirty)
            .map(|(i, _)| i)
    }

    pub fn visible_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_visible).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(camera: Vec3, forward: Vec3, detail: f32) -> FrustumView {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 1000.0);
        let view = Mat4::look_to_rh(camera, forward, Vec3::Y);
        FrustumView::new(&(proj * view), camera, detail)
    }

    fn chunk(x: f32, z: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, z), Vec3::new(x + 16.0, 8.0, z + 16.0))
    }

    #[test]
    fn transition_is_dirty_exactly_once() {
        let mut culler = VisibilityCuller::new([chunk(-8.0, -60.0)]);
        let away = view(Vec3::new(0.0, 4.0, 0.0), Vec3::Z, 200.0);
        let toward = view(Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Z, 200.0);

        culler.update(&away);
        assert!(!culler.records()[0].is_visible);
        assert!(!culler.records()[0].is_dirty);

        culler.update(&toward);
        assert!(culler.records()[0].is_visible);
        assert!(culler.records()[0].is_dirty);
        assert_eq!(culler.dirty().collect::<Vec<_>>(), vec![0]);

        culler.update(&toward);
        assert!(culler.records()[0].is_visible);
        assert!(!culler.records()[0].is_dirty);
    }

    #[test]
    fn distance_flag_only_changes_while_visible() {
        let mut culler = VisibilityCuller::new([chunk(-8.0, -300.0)]);
        let camera = Vec3::new(0.0, 4.0, 0.0);

        culler.update(&view(camera, Vec3::NEG_Z, 100.0));
        let record = culler.records()[0];
        assert!(record.is_visible && record.is_at_distance && record.is_dirty);

        // Looking away keeps the last distance classification.
        culler.update(&view(camera, Vec3::Z, 1000.0));
        let record = culler.records()[0];
        assert!(!record.is_visible && record.is_at_distance && record.is_dirty);

        culler.update(&view(camera, Vec3::NEG_Z, 1000.0));
        let record = culler.records()[0];
        assert!(record.is_visible && !record.is_at_distance && record.is_dirty);
        assert_eq!(culler.visible_count(), 1);
    }
}
