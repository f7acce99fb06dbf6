//! Project load and save on [Engine].
use std::path::Path;

use super::Engine;
use crate::error::Result;
use crate::project::ProjectFile;

impl Engine {
    pub fn load_project(&self, slot: usize, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        self.load_project_from_memory(slot, &bytes)?;
        log::info!("Slot {slot}: loaded {}", path.display());
        Ok(())
    }

    /// Replace the slot's project with the one in `bytes`.
    ///
    /// The document is decoded and the new project built completely before the slot is touched, so a failure leaves
    /// the slot as it was.  On success the slot is stopped at line 0.
    pub fn load_project_from_memory(&self, slot: usize, bytes: &[u8]) -> Result<()> {
        self.open_control(slot)?;
        let fresh = ProjectFile::decode(bytes)?.build(
            self.registry(),
            self.config().sample_rate,
            self.ticks_per_second(),
        )?;

        let old = self.with_slot_mut(slot, |s| Ok(std::mem::replace(s, fresh)))?;
        drop(old);
        Ok(())
    }

    pub fn save_project(&self, slot: usize, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.save_project_to_memory(slot)?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    pub fn save_project_to_memory(&self, slot: usize) -> Result<Vec<u8>> {
        self.with_slot(slot, |s| Ok(ProjectFile::capture(s)))?.encode()
    }
}
