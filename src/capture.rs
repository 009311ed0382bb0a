//! Object capture: draws hologram objects into the off-screen target set.
//!
//! Two passes share one depth buffer:
//!
//! ```text
//! tint pre-pass   {ObjectTint,  ObjectDepth}  clear all    LessEqual  tint material override
//! object pass     {ObjectColor, ObjectDepth}  clear color  LessEqual  objects' own materials
//! ```
//!
//! The pre-pass is cheap (flat tint shaders) and leaves the depth buffer fully
//! populated, so the expensive object draw only shades visible fragments. The
//! object pass must then use `LessEqual`: its fragments land at exactly the
//! depths the pre-pass wrote. Without a pre-pass the depth buffer is cleared
//! with the color.
//!
//! Mappings are drawn in configured order. When two mappings cover the same
//! pixel at the same depth, the later mapping wins, so every mapping list uses
//! `LessEqual`. Only a single mapping without a pre-pass has nothing to tie
//! with and gets the stricter `Less` test.

use crate::commands::{Attachment, ClearFlags, CommandRecorder, DepthState, DrawRenderers};
use crate::layer::LayerTintMapping;

/// What the capture recorded, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub tint_prepass: bool,
    pub tint_draws: usize,
    pub object_draws: usize,
}

/// Whether the tint pre-pass runs for this configuration.
pub fn needs_tint_prepass(mappings: &[LayerTintMapping]) -> bool {
    mappings.iter().any(LayerTintMapping::has_tint)
}

/// Depth test of the object pass.
fn object_depth_state(mappings: &[LayerTintMapping], tint_prepass: bool) -> DepthState {
    if mappings.len() == 1 && !tint_prepass {
        DepthState::LESS
    } else {
        DepthState::LESS_EQUAL
    }
}

/// Records the capture passes for `mappings`.
///
/// `tint_buffer` says whether the target set owns a tint buffer; without one
/// the pre-pass is skipped even if mappings declare tint materials.
pub fn record_capture<R>(
    recorder: &mut R,
    mappings: &[LayerTintMapping],
    tint_buffer: bool,
) -> CaptureSummary
where
    R: CommandRecorder + ?Sized,
{
    let tint_prepass = tint_buffer && needs_tint_prepass(mappings);
    let mut summary = CaptureSummary {
        tint_prepass,
        ..Default::default()
    };

    if tint_prepass {
        recorder.set_render_target(Attachment::ObjectTint, Attachment::ObjectDepth, ClearFlags::ALL);
        for (index, mapping) in mappings.iter().enumerate() {
            let Some(material) = mapping.tint_material.as_deref() else {
                tracing::trace!(index, "mapping has no tint material, skipping tint draw");
                continue;
            };
            if mapping.layers.is_empty() {
                continue;
            }
            recorder.draw_renderers(&DrawRenderers {
                layers: mapping.layers,
                depth: DepthState::LESS_EQUAL,
                override_material: Some(material),
            });
            summary.tint_draws += 1;
        }
    }

    let clear = if tint_prepass {
        ClearFlags::COLOR
    } else {
        ClearFlags::ALL
    };
    let depth = object_depth_state(mappings, tint_prepass);
    recorder.set_render_target(Attachment::ObjectColor, Attachment::ObjectDepth, clear);
    for mapping in mappings.iter().filter(|m| !m.layers.is_empty()) {
        recorder.draw_renderers(&DrawRenderers {
            layers: mapping.layers,
            depth,
            override_material: None,
        });
        summary.object_draws += 1;
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use super::*;
    use crate::color::Color;
    use crate::commands::testing::{Recorded, RecordingRecorder};
    use crate::commands::FullScreenDraw;
    use crate::layer::LayerMask;
    use crate::material::Material;

    fn tinted(mask: u32, name: &str) -> LayerTintMapping {
        LayerTintMapping::new(mask).with_tint(Rc::new(Material::tint(name, Color::WHITE)))
    }

    #[test]
    fn tint_prepass_then_object_pass() {
        let mappings = [tinted(0b01, "t1")];
        let tint_id = mappings[0].tint_material.as_ref().unwrap().id();
        let mut recorder = RecordingRecorder::default();

        let summary = record_capture(&mut recorder, &mappings, true);

        assert_eq!(
            recorder.commands,
            vec![
                Recorded::SetTarget {
                    color: Attachment::ObjectTint,
                    depth: Attachment::ObjectDepth,
                    clear: ClearFlags::ALL,
                },
                Recorded::Renderers {
                    layers: LayerMask(0b01),
                    depth: DepthState::LESS_EQUAL,
                    material: Some(tint_id),
                },
                Recorded::SetTarget {
                    color: Attachment::ObjectColor,
                    depth: Attachment::ObjectDepth,
                    clear: ClearFlags::COLOR,
                },
                Recorded::Renderers {
                    layers: LayerMask(0b01),
                    depth: DepthState::LESS_EQUAL,
                    material: None,
                },
            ]
        );
        assert_eq!(
            summary,
            CaptureSummary {
                tint_prepass: true,
                tint_draws: 1,
                object_draws: 1,
            }
        );
    }

    #[test]
    fn untinted_mapping_lists_keep_less_equal() {
        let mappings = [LayerTintMapping::new(0b01), LayerTintMapping::new(0b10)];
        let mut recorder = RecordingRecorder::default();

        record_capture(&mut recorder, &mappings, false);

        assert_eq!(recorder.renderer_draws().count(), 2);
        assert!(recorder.renderer_draws().all(|c| matches!(
            c,
            Recorded::Renderers {
                depth: DepthState::LESS_EQUAL,
                ..
            }
        )));
    }

    #[test]
    fn single_untinted_mapping_uses_strict_depth_and_full_clear() {
        let mappings = [LayerTintMapping::new(0b10)];
        let mut recorder = RecordingRecorder::default();

        let summary = record_capture(&mut recorder, &mappings, false);

        assert!(!summary.tint_prepass);
        assert_eq!(
            recorder.commands,
            vec![
                Recorded::SetTarget {
                    color: Attachment::ObjectColor,
                    depth: Attachment::ObjectDepth,
                    clear: ClearFlags::ALL,
                },
                Recorded::Renderers {
                    layers: LayerMask(0b10),
                    depth: DepthState::LESS,
                    material: None,
                },
            ]
        );
    }

    #[test]
    fn missing_tint_material_is_skipped_without_aborting() {
        let mappings = [
            tinted(0b001, "a"),
            LayerTintMapping::new(0b010),
            tinted(0b100, "c"),
        ];
        let mut recorder = RecordingRecorder::default();

        let summary = record_capture(&mut recorder, &mappings, true);

        assert_eq!(summary.tint_draws, 2);
        assert_eq!(summary.object_draws, 3);
        let tint_layers: Vec<_> = recorder
            .renderer_draws()
            .filter_map(|c| match c {
                Recorded::Renderers {
                    layers,
                    material: Some(_),
                    ..
                } => Some(*layers),
                _ => None,
            })
            .collect();
        assert_eq!(tint_layers, vec![LayerMask(0b001), LayerMask(0b100)]);
    }

    #[test]
    fn no_tint_buffer_skips_prepass() {
        let mappings = [tinted(0b01, "t")];
        let mut recorder = RecordingRecorder::default();
        let summary = record_capture(&mut recorder, &mappings, false);
        assert!(!summary.tint_prepass);
        assert_eq!(recorder.commands.len(), 2);
    }

    #[test]
    fn empty_mapping_list_still_clears_object_buffers() {
        let mut recorder = RecordingRecorder::default();
        let summary = record_capture(&mut recorder, &[], true);
        assert_eq!(summary, CaptureSummary::default());
        assert_eq!(
            recorder.commands,
            vec![Recorded::SetTarget {
                color: Attachment::ObjectColor,
                depth: Attachment::ObjectDepth,
                clear: ClearFlags::ALL,
            }]
        );
    }

    // A one-row software rasterizer. Every object covers a pixel span at a
    // constant depth; draws go through the same depth policy as the GPU.
    struct SimObject {
        name: &'static str,
        layers: LayerMask,
        depth: f32,
        span: std::ops::Range<usize>,
    }

    struct SimRecorder<'s> {
        scene: &'s [SimObject],
        color: Vec<Option<String>>,
        tint: Vec<Option<String>>,
        depth: Vec<f32>,
        bound: Option<Attachment>,
        // object names drawn by each renderer draw, with the draw's mask
        draws: Vec<(LayerMask, BTreeSet<&'static str>)>,
    }

    impl<'s> SimRecorder<'s> {
        fn new(scene: &'s [SimObject], width: usize) -> Self {
            Self {
                scene,
                color: vec![None; width],
                tint: vec![None; width],
                depth: vec![1.0; width],
                bound: None,
                draws: Vec::new(),
            }
        }
    }

    impl CommandRecorder for SimRecorder<'_> {
        fn set_render_target(&mut self, color: Attachment, _depth: Attachment, clear: ClearFlags) {
            self.bound = Some(color);
            if clear.color {
                let target = match color {
                    Attachment::ObjectTint => &mut self.tint,
                    _ => &mut self.color,
                };
                target.iter_mut().for_each(|p| *p = None);
            }
            if clear.depth {
                self.depth.iter_mut().for_each(|d| *d = 1.0);
            }
        }

        fn draw_renderers(&mut self, draw: &DrawRenderers<'_>) {
            let scene = self.scene;
            let mut drawn = BTreeSet::new();
            for object in scene.iter().filter(|o| o.layers.intersects(draw.layers)) {
                drawn.insert(object.name);
                let value = draw
                    .override_material
                    .map(|m| m.name().to_owned())
                    .unwrap_or_else(|| object.name.to_owned());
                for px in object.span.clone() {
                    if !draw.depth.passes(object.depth, self.depth[px]) {
                        continue;
                    }
                    let target = match self.bound {
                        Some(Attachment::ObjectTint) => &mut self.tint,
                        _ => &mut self.color,
                    };
                    target[px] = Some(value.clone());
                    if draw.depth.write {
                        self.depth[px] = object.depth;
                    }
                }
            }
            self.draws.push((draw.layers, drawn));
        }

        fn draw_full_screen(&mut self, _draw: &FullScreenDraw<'_>) {}
    }

    #[test]
    fn disjoint_masks_do_not_cross_contaminate() {
        let scene = [
            SimObject {
                name: "left",
                layers: LayerMask(0b01),
                depth: 0.5,
                span: 0..4,
            },
            SimObject {
                name: "right",
                layers: LayerMask(0b10),
                depth: 0.5,
                span: 4..8,
            },
        ];
        let mappings = [tinted(0b01, "tint-left"), tinted(0b10, "tint-right")];
        let mut sim = SimRecorder::new(&scene, 8);

        record_capture(&mut sim, &mappings, true);

        for (mask, drawn) in &sim.draws {
            for name in drawn {
                let object = scene.iter().find(|o| o.name == *name).unwrap();
                assert!(mask.intersects(object.layers), "{name} drawn under {mask:?}");
            }
        }
        assert_eq!(sim.tint[0].as_deref(), Some("tint-left"));
        assert_eq!(sim.tint[7].as_deref(), Some("tint-right"));
    }

    #[test]
    fn overlapping_mappings_at_equal_depth_last_tint_wins() {
        let scene = [
            SimObject {
                name: "first",
                layers: LayerMask(0b01),
                depth: 0.4,
                span: 0..6,
            },
            SimObject {
                name: "second",
                layers: LayerMask(0b10),
                depth: 0.4,
                span: 3..9,
            },
        ];
        let mappings = [tinted(0b01, "tint-1"), tinted(0b10, "tint-2")];

        let run = || {
            let mut sim = SimRecorder::new(&scene, 9);
            record_capture(&mut sim, &mappings, true);
            (sim.tint, sim.color)
        };
        let (tint, color) = run();

        assert_eq!(tint[2].as_deref(), Some("tint-1"));
        for px in 3..6 {
            assert_eq!(tint[px].as_deref(), Some("tint-2"));
            assert_eq!(color[px].as_deref(), Some("second"));
        }
        for _ in 0..5 {
            assert_eq!(run(), (tint.clone(), color.clone()));
        }
    }

    #[test]
    fn untinted_overlap_at_equal_depth_shows_later_mapping() {
        let scene = [
            SimObject {
                name: "first",
                layers: LayerMask(0b01),
                depth: 0.4,
                span: 0..6,
            },
            SimObject {
                name: "second",
                layers: LayerMask(0b10),
                depth: 0.4,
                span: 3..9,
            },
        ];
        let mappings = [LayerTintMapping::new(0b01), LayerTintMapping::new(0b10)];
        let mut sim = SimRecorder::new(&scene, 9);

        let summary = record_capture(&mut sim, &mappings, false);

        assert!(!summary.tint_prepass);
        assert_eq!(sim.color[2].as_deref(), Some("first"));
        assert_eq!(sim.color[4].as_deref(), Some("second"));
        assert_eq!(sim.color[8].as_deref(), Some("second"));
    }

    #[test]
    fn prepass_depth_does_not_reject_object_draw() {
        let scene = [SimObject {
            name: "holo",
            layers: LayerMask(0b1),
            depth: 0.25,
            span: 0..4,
        }];
        let mappings = [tinted(0b1, "tint")];
        let mut sim = SimRecorder::new(&scene, 4);

        record_capture(&mut sim, &mappings, true);

        assert!(sim.color.iter().all(|p| p.as_deref() == Some("holo")));
        assert!(sim.depth.iter().all(|&d| d == 0.25));
    }

    #[test]
    fn nearer_object_occludes_across_mappings() {
        let scene = [
            SimObject {
                name: "far",
                layers: LayerMask(0b01),
                depth: 0.8,
                span: 0..4,
            },
            SimObject {
                name: "near",
                layers: LayerMask(0b10),
                depth: 0.2,
                span: 0..4,
            },
        ];
        // near is drawn first, far must not overwrite it
        let mappings = [tinted(0b10, "tint-near"), tinted(0b01, "tint-far")];
        let mut sim = SimRecorder::new(&scene, 4);

        record_capture(&mut sim, &mappings, true);

        assert!(sim.tint.iter().all(|p| p.as_deref() == Some("tint-near")));
        assert!(sim.color.iter().all(|p| p.as_deref() == Some("near")));
    }
}
