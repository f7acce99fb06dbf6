use std::any::Any;

use super::*;

/// Brings the externally supplied block into the graph when the engine is used as a filter.
///
/// Outside of filter rendering this produces silence.
#[derive(Debug, Default)]
pub struct Input;

impl Input {
    pub const TYPE_NAME: &'static str = "Input";

    const VOLUME: usize = 0;

    pub fn new() -> Self {
        Input
    }
}

impl ModuleHandler for Input {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Generator
    }

    fn controllers(&self) -> Vec<ControllerSpec> {
        vec![ControllerSpec::new("Volume", 0, 1024, 256)]
    }

    fn handle_event(&mut self, _event: &ModuleEvent, _controllers: &[Controller]) {}

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let Some(external) = ctx.external else {
            return;
        };
        let gain = ctx.controllers[Self::VOLUME].raw() as f32 / 256.0;
        for (o, i) in ctx.outputs.iter_mut().zip(external.iter()) {
            for (o, i) in o.iter_mut().zip(i.iter()) {
                *o = *i * gain;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
