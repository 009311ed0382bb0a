//! Layer masks and the layer → tint mapping that selects hologram objects.
//!
//! Every renderable carries a [`LayerMask`]. The hologram pass is configured
//! with a list of [`LayerTintMapping`]s; each mapping selects the objects whose
//! layers intersect its mask and optionally names a tint material that is
//! stamped into the tint buffer before the full object draw.
//!
//! Before the host culls the scene it must ask the pass for the union of all
//! mapping masks (see [`aggregate_culling_mask`]). Objects culled out before
//! capture would otherwise pop in and out of the effect.

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::rc::Rc;

use crate::material::Material;

/// A 32-bit object selection mask. Bit `n` stands for layer `n`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Selects nothing.
    pub const EMPTY: LayerMask = LayerMask(0);
    /// Selects every layer.
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// Mask containing only layer `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 32`.
    pub const fn layer(index: u32) -> Self {
        assert!(index < 32, "layer index out of range");
        LayerMask(1 << index)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any layer is shared between the two masks.
    pub const fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every layer of `other` is also in `self`.
    pub const fn contains(self, other: LayerMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// This mask with the layers of `other` removed.
    pub const fn without(self, other: LayerMask) -> Self {
        LayerMask(self.0 & !other.0)
    }
}

impl BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for LayerMask {
    fn bitor_assign(&mut self, rhs: LayerMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LayerMask {
    type Output = LayerMask;

    fn bitand(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 & rhs.0)
    }
}

impl Not for LayerMask {
    type Output = LayerMask;

    fn not(self) -> LayerMask {
        LayerMask(!self.0)
    }
}

impl From<u32> for LayerMask {
    fn from(bits: u32) -> Self {
        LayerMask(bits)
    }
}

/// Selects a set of layers for the hologram effect, with an optional tint
/// material drawn into the tint buffer first.
#[derive(Clone, Debug)]
pub struct LayerTintMapping {
    /// Objects on any of these layers are captured.
    pub layers: LayerMask,
    /// Override material for the tint pre-pass. `None` skips the pre-pass
    /// for this mapping.
    pub tint_material: Option<Rc<Material>>,
}

impl LayerTintMapping {
    pub fn new(layers: impl Into<LayerMask>) -> Self {
        Self {
            layers: layers.into(),
            tint_material: None,
        }
    }

    pub fn with_tint(mut self, material: Rc<Material>) -> Self {
        self.tint_material = Some(material);
        self
    }

    pub fn has_tint(&self) -> bool {
        self.tint_material.is_some()
    }
}

/// The visibility-culling inputs the host hands to each pass before culling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullingParameters {
    /// Only objects on these layers survive culling.
    pub culling_mask: LayerMask,
}

impl CullingParameters {
    pub fn new(culling_mask: LayerMask) -> Self {
        Self { culling_mask }
    }

    /// Whether an object on `layers` survives culling.
    pub fn accepts(&self, layers: LayerMask) -> bool {
        self.culling_mask.intersects(layers)
    }
}

/// Union of every mapping's selection mask.
///
/// An empty list yields [`LayerMask::EMPTY`], which is valid: the pass then
/// captures nothing.
pub fn aggregate_culling_mask(mappings: &[LayerTintMapping]) -> LayerMask {
    mappings
        .iter()
        .fold(LayerMask::EMPTY, |mask, mapping| mask | mapping.layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_mapping_list_yields_empty_mask() {
        assert_eq!(aggregate_culling_mask(&[]), LayerMask::EMPTY);
    }

    #[test]
    fn mask_is_union_of_mappings() {
        let mappings = [
            LayerTintMapping::new(0b0001),
            LayerTintMapping::new(0b0100),
            LayerTintMapping::new(0b0101),
        ];
        assert_eq!(aggregate_culling_mask(&mappings), LayerMask(0b0101));
    }

    #[test]
    fn layer_helpers() {
        let mask = LayerMask::layer(3) | LayerMask::layer(5);
        assert!(mask.contains(LayerMask::layer(3)));
        assert!(!mask.contains(LayerMask::layer(4)));
        assert!(mask.intersects(LayerMask(0b1000)));
        assert_eq!(mask.without(LayerMask::layer(3)), LayerMask::layer(5));
        assert_eq!(!LayerMask::EMPTY, LayerMask::ALL);
    }

    #[test]
    fn culling_parameters_accept_intersecting_layers() {
        let params = CullingParameters::new(LayerMask(0b0110));
        assert!(params.accepts(LayerMask(0b0010)));
        assert!(!params.accepts(LayerMask(0b1001)));
    }

    proptest! {
        #[test]
        fn aggregation_ignores_mapping_order(masks in proptest::collection::vec(any::<u32>(), 0..8)) {
            let forward: Vec<_> = masks.iter().map(|&m| LayerTintMapping::new(m)).collect();
            let reversed: Vec<_> = masks.iter().rev().map(|&m| LayerTintMapping::new(m)).collect();
            prop_assert_eq!(aggregate_culling_mask(&forward), aggregate_culling_mask(&reversed));
        }

        #[test]
        fn aggregation_covers_every_mapping(masks in proptest::collection::vec(any::<u32>(), 1..8)) {
            let mappings: Vec<_> = masks.iter().map(|&m| LayerTintMapping::new(m)).collect();
            let union = aggregate_culling_mask(&mappings);
            for mapping in &mappings {
                prop_assert!(union.contains(mapping.layers));
            }
        }
    }
}
