// SPDX-License-Identifier: CEPL-1.0
use crate::{FatalError, ResourceTable};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        }
    }
}

/// Per-object table entry that knows how many indices it draws.
pub trait IndexedDraw {
    fn index_count(&self) -> u32;
}

/// Command stream for one presentable image.
pub trait CommandRecorder {
    type Entry: IndexedDraw;

    fn begin_pass(&mut self, clear: &ClearValues) -> Result<(), FatalError>;
    fn bind_pipeline(&mut self);
    fn bind_vertex_buffer(&mut self, entry: &Self::Entry);
    fn bind_index_buffer(&mut self, entry: &Self::Entry);
    fn bind_descriptor_set(&mut self, entry: &Self::Entry);
    fn draw_indexed(&mut self, index_count: u32);
    fn end_pass(&mut self) -> Result<(), FatalError>;
}

/// Clears, then draws every object in table order. Returns the draw count.
pub fn record_scene<R: CommandRecorder>(
    rec: &mut R,
    objects: &ResourceTable<R::Entry>,
    clear: &ClearValues,
) -> Result<usize, FatalError> {
    rec.begin_pass(clear)?;
    rec.bind_pipeline();
    let mut draws = 0;
    for entry in objects.values() {
        rec.bind_vertex_buffer(entry);
        rec.bind_index_buffer(entry);
        rec.bind_descriptor_set(entry);
        rec.draw_indexed(entry.index_count());
        draws += 1;
    }
    rec.end_pass()?;
    Ok(draws)
}
