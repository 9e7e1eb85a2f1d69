// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The resource atlas: a fixed set of GPU array slots caching textures.
//!
//! Probes and projectors reference arbitrary textures, but the shading pass
//! can only bind one array texture per kind. [`ResourceAtlas`] keeps the
//! most recently used sources resident in that array.
//!
//! Slot lookup and eviction are plain linear scans over at most a few dozen
//! slots. A hash map plus an intrusive LRU list would cost more than the scan
//! at this size, so the scan is kept deliberately.

use murk_core::renderer::{
    AtlasCopy, AtlasDescriptor, AtlasKind, AtlasSetConfig, GraphicsDevice, Residency,
    ResourceError, TextureFormat, TextureId, TextureSource,
};
use thiserror::Error;

/// Why a source texture cannot be cached in an atlas.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtlasRejection {
    /// The texture has no data.
    #[error("texture {0:?} not found")]
    NotLoaded(TextureId),
    /// The texture is still streaming in.
    #[error("texture {0:?} is not fully streamed in")]
    PartiallyStreamed(TextureId),
    /// The pixel format differs from the atlas array.
    #[error("texture {id:?} has format {found:?}, atlas expects {expected:?}")]
    FormatMismatch {
        /// Source texture.
        id: TextureId,
        /// Format of the source.
        found: TextureFormat,
        /// Format of the atlas.
        expected: TextureFormat,
    },
    /// The texture is not square, or smaller than an atlas slot.
    #[error("texture {id:?} is {width}x{height}, atlas needs a square of at least {min}")]
    BadSize {
        /// Source texture.
        id: TextureId,
        /// Source width.
        width: u32,
        /// Source height.
        height: u32,
        /// Slot size of the atlas.
        min: u32,
    },
    /// A cubemap was offered to a 2D atlas or the other way around.
    #[error("texture {0:?} does not match the atlas cube layout")]
    LayoutMismatch(TextureId),
    /// The device refused the copy.
    #[error("copy of texture {id:?} failed: {source}")]
    CopyFailed {
        /// Source texture.
        id: TextureId,
        /// Device error.
        #[source]
        source: ResourceError,
    },
}

/// One array layer of an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasSlot {
    /// Source currently bound to the slot.
    pub texture: Option<TextureId>,
    /// Frame of the last lookup that hit this slot.
    pub last_access: u64,
    /// Update stamp of the source when it was copied.
    pub last_update: u64,
    /// The bound source failed validation; requests for it are refused
    /// without retrying until the source changes.
    pub invalid: bool,
}

impl AtlasSlot {
    /// Eviction key: empty slots come first, then the oldest access.
    fn eviction_key(&self) -> u64 {
        match self.texture {
            None => 0,
            Some(_) => self.last_access.saturating_add(1),
        }
    }
}

/// A fixed-capacity texture array cache with least-recently-used eviction.
#[derive(Debug)]
pub struct ResourceAtlas {
    kind: AtlasKind,
    descriptor: AtlasDescriptor,
    slots: Vec<AtlasSlot>,
    frame: u64,
    updates: u64,
}

impl ResourceAtlas {
    /// Creates an empty atlas.
    pub fn new(kind: AtlasKind, descriptor: AtlasDescriptor) -> Self {
        Self {
            kind,
            descriptor,
            slots: vec![AtlasSlot::default(); descriptor.capacity.max(1)],
            frame: 0,
            updates: 0,
        }
    }

    /// Sets the access stamp used by lookups during this frame.
    pub fn begin_frame(&mut self, frame_id: u64) {
        self.frame = frame_id;
    }

    /// Returns the slot holding `source`, copying it in if needed.
    ///
    /// With `explicit_slot` the source must end up in that slot (used to keep
    /// paired textures at the same index); otherwise the least recently
    /// accessed slot is evicted. Returns `None` if the source cannot be
    /// cached; such a source is remembered and refused without another copy
    /// attempt until its update stamp changes.
    pub fn insert(
        &mut self,
        device: &dyn GraphicsDevice,
        source: &TextureSource,
        explicit_slot: Option<usize>,
    ) -> Option<u32> {
        if let Some(slot) = explicit_slot {
            if slot >= self.slots.len() {
                log::warn!(
                    "{:?} atlas: explicit slot {slot} out of range (capacity {})",
                    self.kind,
                    self.slots.len()
                );
                return None;
            }
        }

        let mut resident = None;
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if entry.texture != Some(source.id) {
                continue;
            }
            let up_to_date = source.update_stamp == 0 || source.update_stamp == entry.last_update;
            if up_to_date && explicit_slot.is_none_or(|slot| slot == index) {
                entry.last_access = self.frame;
                if entry.invalid {
                    return None;
                }
                return Some(index as u32);
            }
            resident = Some(index);
        }

        let target = match (explicit_slot, resident) {
            (Some(slot), _) => slot,
            (None, Some(index)) => index,
            (None, None) => {
                let index = self.lru_slot();
                let victim = &self.slots[index];
                // Every slot is already referenced by a record of this frame.
                if victim.texture.is_some() && victim.last_access == self.frame {
                    log::debug!(
                        "{:?} atlas full this frame, dropping {:?}",
                        self.kind,
                        source.id
                    );
                    return None;
                }
                index
            }
        };
        // A source moved to another explicit slot leaves no stale copy behind.
        if let Some(index) = resident.filter(|&index| index != target) {
            self.slots[index] = AtlasSlot::default();
        }

        let entry = &mut self.slots[target];
        entry.texture = Some(source.id);
        entry.last_access = self.frame;
        entry.last_update = source.update_stamp;
        entry.invalid = false;

        let result = self
            .validate(source)
            .and_then(|mip_offset| self.copy(device, source, target as u32, mip_offset));
        match result {
            Ok(()) => {
                self.updates += 1;
                log::trace!("{:?} atlas: {:?} -> slot {target}", self.kind, source.id);
                Some(target as u32)
            }
            Err(rejection) => {
                self.slots[target].invalid = true;
                log::warn!("{:?} atlas: {rejection}", self.kind);
                None
            }
        }
    }

    /// Index of the slot with the oldest access stamp, first one on ties.
    fn lru_slot(&self) -> usize {
        let mut best = 0;
        let mut best_key = u64::MAX;
        for (index, slot) in self.slots.iter().enumerate() {
            let key = slot.eviction_key();
            if key < best_key {
                best_key = key;
                best = index;
            }
        }
        best
    }

    /// Checks that `source` fits the array, returning the source mip that
    /// matches the slot's mip 0.
    fn validate(&self, source: &TextureSource) -> Result<u32, AtlasRejection> {
        let d = &self.descriptor;
        match source.residency {
            Residency::NotLoaded => return Err(AtlasRejection::NotLoaded(source.id)),
            Residency::PartiallyStreamed => {
                return Err(AtlasRejection::PartiallyStreamed(source.id))
            }
            Residency::Resident => {}
        }
        if source.format != d.format {
            return Err(AtlasRejection::FormatMismatch {
                id: source.id,
                found: source.format,
                expected: d.format,
            });
        }
        if source.width != source.height || source.width < d.size {
            return Err(AtlasRejection::BadSize {
                id: source.id,
                width: source.width,
                height: source.height,
                min: d.size,
            });
        }
        if source.is_cube != d.is_cube {
            return Err(AtlasRejection::LayoutMismatch(source.id));
        }
        Ok((source.width / d.size.max(1)).ilog2())
    }

    fn copy(
        &self,
        device: &dyn GraphicsDevice,
        source: &TextureSource,
        slot: u32,
        mip_offset: u32,
    ) -> Result<(), AtlasRejection> {
        let mips = self
            .descriptor
            .mip_count
            .min(source.mip_count.saturating_sub(mip_offset));
        for target_mip in 0..mips {
            for face in 0..source.face_count() {
                let copy = AtlasCopy {
                    atlas: self.kind,
                    source: source.id,
                    source_mip: target_mip + mip_offset,
                    slot,
                    target_mip,
                    face,
                };
                device
                    .copy_to_atlas(&copy)
                    .map_err(|source_err| AtlasRejection::CopyFailed {
                        id: source.id,
                        source: source_err,
                    })?;
            }
        }
        Ok(())
    }

    /// Which atlas this is.
    pub fn kind(&self) -> AtlasKind {
        self.kind
    }

    /// Shape of the atlas array.
    pub fn descriptor(&self) -> &AtlasDescriptor {
        &self.descriptor
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// All slots, in index order.
    pub fn slots(&self) -> &[AtlasSlot] {
        &self.slots
    }

    /// Total successful insertions that copied data.
    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

/// The three atlases shared by the lighting and fog passes.
#[derive(Debug)]
pub struct AtlasSet {
    /// Prefiltered specular probe cubemaps.
    pub specular_probes: ResourceAtlas,
    /// Irradiance probe cubemaps, slot-aligned with `specular_probes`.
    pub diffuse_probes: ResourceAtlas,
    /// Projector textures.
    pub projector_gobos: ResourceAtlas,
}

impl AtlasSet {
    /// Creates empty atlases shaped by `config`.
    pub fn new(config: &AtlasSetConfig) -> Self {
        Self {
            specular_probes: ResourceAtlas::new(AtlasKind::SpecularProbes, config.specular_probes),
            diffuse_probes: ResourceAtlas::new(AtlasKind::DiffuseProbes, config.diffuse_probes),
            projector_gobos: ResourceAtlas::new(AtlasKind::ProjectorGobos, config.projector_gobos),
        }
    }

    /// Sets the access stamp of every atlas.
    pub fn begin_frame(&mut self, frame_id: u64) {
        self.specular_probes.begin_frame(frame_id);
        self.diffuse_probes.begin_frame(frame_id);
        self.projector_gobos.begin_frame(frame_id);
    }

    /// Total successful insertions across the three atlases.
    pub fn update_count(&self) -> u64 {
        self.specular_probes.update_count()
            + self.diffuse_probes.update_count()
            + self.projector_gobos.update_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murk_core::renderer::HeadlessDevice;

    fn gobo_atlas(capacity: usize) -> ResourceAtlas {
        ResourceAtlas::new(
            AtlasKind::ProjectorGobos,
            AtlasDescriptor {
                capacity,
                size: 64,
                mip_count: 3,
                format: TextureFormat::Rgba8Unorm,
                is_cube: false,
            },
        )
    }

    fn gobo(id: u64) -> TextureSource {
        TextureSource::resident_2d(id, 64, TextureFormat::Rgba8Unorm)
    }

    #[test]
    fn test_second_insert_is_a_cache_hit() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(4);
        atlas.begin_frame(1);
        let a = atlas.insert(&device, &gobo(1), None);
        let copies = device.atlas_copies().len();
        let b = atlas.insert(&device, &gobo(1), None);
        assert_eq!(a, Some(0));
        assert_eq!(a, b);
        assert_eq!(device.atlas_copies().len(), copies);
        assert_eq!(atlas.update_count(), 1);
    }

    #[test]
    fn test_empty_slots_fill_before_eviction() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(3);
        for (frame, id) in [(1, 10), (2, 11), (3, 12)] {
            atlas.begin_frame(frame);
            assert_eq!(atlas.insert(&device, &gobo(id), None), Some((id - 10) as u32));
        }
        // Touch slot 0 so slot 1 becomes the oldest.
        atlas.begin_frame(4);
        assert_eq!(atlas.insert(&device, &gobo(10), None), Some(0));
        atlas.begin_frame(5);
        assert_eq!(atlas.insert(&device, &gobo(13), None), Some(1));
        assert_eq!(atlas.slots()[1].texture, Some(TextureId(13)));
    }

    #[test]
    fn test_large_source_copies_matching_mips() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(1);
        let big = TextureSource::resident_2d(5, 256, TextureFormat::Rgba8Unorm);
        assert_eq!(atlas.insert(&device, &big, None), Some(0));
        let copies = device.atlas_copies();
        assert_eq!(copies.len(), 3);
        assert_eq!(copies[0].source_mip, 2);
        assert_eq!(copies[0].target_mip, 0);
    }

    #[test]
    fn test_incompatible_source_is_negatively_cached() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(2);
        let wrong = TextureSource::resident_2d(3, 64, TextureFormat::Bc1RgbaUnorm);
        assert_eq!(atlas.insert(&device, &wrong, None), None);
        assert!(atlas.slots()[0].invalid);
        assert_eq!(atlas.insert(&device, &wrong, None), None);
        // The second request hit the cached failure instead of taking a new slot.
        assert_eq!(atlas.slots()[1].texture, None);
        assert_eq!(atlas.update_count(), 0);
        assert!(device.atlas_copies().is_empty());
    }

    #[test]
    fn test_updated_source_is_copied_in_place() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(3);
        let mut tex = gobo(8);
        tex.update_stamp = 3;
        atlas.begin_frame(1);
        assert_eq!(atlas.insert(&device, &tex, None), Some(0));
        tex.update_stamp = 4;
        atlas.begin_frame(2);
        assert_eq!(atlas.insert(&device, &tex, None), Some(0));
        assert_eq!(atlas.update_count(), 2);
        let holding: Vec<usize> = atlas
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.texture == Some(TextureId(8)))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(holding, vec![0]);
        assert_eq!(atlas.slots()[0].last_update, 4);
    }

    #[test]
    fn test_explicit_slot_moves_resident_source() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(3);
        atlas.begin_frame(1);
        assert_eq!(atlas.insert(&device, &gobo(4), None), Some(0));
        assert_eq!(atlas.insert(&device, &gobo(4), Some(2)), Some(2));
        assert_eq!(atlas.slots()[0].texture, None);
        assert_eq!(atlas.slots()[2].texture, Some(TextureId(4)));
    }

    #[test]
    fn test_full_atlas_refuses_eviction_within_a_frame() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(2);
        atlas.begin_frame(1);
        assert_eq!(atlas.insert(&device, &gobo(1), None), Some(0));
        assert_eq!(atlas.insert(&device, &gobo(2), None), Some(1));
        assert_eq!(atlas.insert(&device, &gobo(3), None), None);
        assert_eq!(atlas.slots()[0].texture, Some(TextureId(1)));
        assert_eq!(atlas.update_count(), 2);

        // The next frame may evict again.
        atlas.begin_frame(2);
        assert_eq!(atlas.insert(&device, &gobo(3), None), Some(0));
    }

    #[test]
    fn test_explicit_slot_out_of_range_fails() {
        let device = HeadlessDevice::new();
        let mut atlas = gobo_atlas(2);
        assert_eq!(atlas.insert(&device, &gobo(1), Some(5)), None);
        assert_eq!(atlas.insert(&device, &gobo(1), Some(1)), Some(1));
    }
}
