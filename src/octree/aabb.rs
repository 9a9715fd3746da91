use glam::DVec3;

/// Axis-aligned box in display axis order (storage y and z swapped).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x * size.y * size.z
    }

    pub fn translated(&self, by: DVec3) -> Self {
        Self::new(self.min + by, self.max + by)
    }

    /// Volume shared with `other`, zero when they only touch.
    pub fn intersection_volume(&self, other: &Aabb) -> f64 {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        let extent = (max - min).max(DVec3::ZERO);
        extent.x * extent.y * extent.z
    }
}

/// Box of the child at `index` (0..8) of `aabb`.
///
/// Bit 0 selects the upper half on y, bit 1 on z and bit 2 on x. This is
/// the child-mask bit order of the hierarchy files once the stored y and z
/// axes are swapped into display order.
pub fn create_child_aabb(aabb: &Aabb, index: usize) -> Aabb {
    let mut min = aabb.min;
    let mut max = aabb.max;
    let size = (max - min) * 0.5;

    if (index & 0b0001) > 0 {
        min.y += size.y;
    } else {
        max.y -= size.y;
    }
    if (index & 0b0010) > 0 {
        min.z += size.z;
    } else {
        max.z -= size.z;
    }
    if (index & 0b0100) > 0 {
        min.x += size.x;
    } else {
        max.x -= size.x;
    }

    Aabb::new(min, max)
}
