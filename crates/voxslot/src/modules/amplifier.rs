use std::any::Any;

use super::*;

/// Gain, balance and phase inversion.
#[derive(Debug, Default)]
pub struct Amplifier;

impl Amplifier {
    pub const TYPE_NAME: &'static str = "Amplifier";

    const VOLUME: usize = 0;
    const PANNING: usize = 1;
    const INVERSE: usize = 2;

    pub fn new() -> Self {
        Amplifier
    }
}

impl ModuleHandler for Amplifier {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Effect
    }

    fn controllers(&self) -> Vec<ControllerSpec> {
        vec![
            ControllerSpec::new("Volume", 0, 1024, 256),
            ControllerSpec::new("Panning", 0, 256, 128).with_offset(-128),
            ControllerSpec::new("Inverse", 0, 1, 0).selector(),
        ]
    }

    fn handle_event(&mut self, _event: &ModuleEvent, _controllers: &[Controller]) {}

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let c = ctx.controllers;
        let mut gain = c[Self::VOLUME].raw() as f32 / 256.0;
        if c[Self::INVERSE].raw() != 0 {
            gain = -gain;
        }
        let (left, right) = pan_gains(c[Self::PANNING].raw());

        for ((o, i), pan) in ctx
            .outputs
            .iter_mut()
            .zip(ctx.inputs.iter())
            .zip([left, right])
        {
            for (o, i) in o.iter_mut().zip(i.iter()) {
                *o = *i * gain * pan;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
