use glam::{Mat4, Vec3, Vec4};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Positive-vertex test: the box is outside as soon as its corner furthest
    /// along a plane normal lies behind that plane.
    pub fn intersects_frustum(&self, frustum_planes: &[Vec4; 6]) -> bool {
        for plane in frustum_planes {
            let p = Vec3::new(
                if plane.x > 0.0 { self.max.x } else { self.min.x },
                if plane.y > 0.0 { self.max.y } else { self.min.y },
                if plane.z > 0.0 { self.max.z } else { self.min.z },
            );
            if plane.truncate().dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

pub fn extract_frustum_planes(view_proj: &Mat4) -> [Vec4; 6] {
    let r0 = view_proj.row(0);
    let r1 = view_proj.row(1);
    let r2 = view_proj.row(2);
    let r3 = view_proj.row(3);

    let mut planes = [
        r3 + r0, // Left
        r3 - r0, // Right
        r3 + r1, // Bottom
        r3 - r1, // Top
        r2,      // Near (depth is [0, 1])
        r3 - r2, // Far
    ];

    // Normalize planes so that distances are in world units
    for plane in &mut planes {
        let length = plane.truncate().length();
        if length > 0.0 {
            *plane /= length;
        }
    }

    planes
}
