use std::any::Any;

use super::*;

/// The slot's sink: passes the sum of its inputs through unchanged.
#[derive(Debug, Default)]
pub struct Output;

impl Output {
    pub const TYPE_NAME: &'static str = "Output";

    pub fn new() -> Self {
        Output
    }
}

impl ModuleHandler for Output {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Output
    }

    fn controllers(&self) -> Vec<ControllerSpec> {
        vec![]
    }

    fn handle_event(&mut self, _event: &ModuleEvent, _controllers: &[Controller]) {}

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for (o, i) in ctx.outputs.iter_mut().zip(ctx.inputs.iter()) {
            o.copy_from_slice(i);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
