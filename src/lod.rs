//! Web mercator levels of detail.
//!
//! Level 0 shows the whole world in a single 256 px tile; every level halves both
//! resolution (map units per pixel) and scale.

use crate::ZoomLevel;
use serde::{Deserialize, Serialize};

/// Map units (meters) per pixel at level 0.
pub const WEB_MERCATOR_RESOLUTION_0: f64 = 156_543.033_928_000_14;

/// Map scale denominator at level 0.
pub const WEB_MERCATOR_SCALE_0: f64 = 591_657_527.591_555;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelOfDetail {
    pub level: ZoomLevel,
    pub resolution: f64,
    pub scale: f64,
}

impl LevelOfDetail {
    pub fn web_mercator(level: ZoomLevel) -> Self {
        let factor = 2f64.powi(level as i32);
        Self {
            level,
            resolution: WEB_MERCATOR_RESOLUTION_0 / factor,
            scale: WEB_MERCATOR_SCALE_0 / factor,
        }
    }

    /// Whether a map displayed at `scale` falls into this level's range.
    ///
    /// A level covers scales from its own scale (inclusive) up to the coarser
    /// level's scale (exclusive). The coarsest level covers everything above it.
    pub fn scale_in_range(&self, scale: f64, coarser: Option<&LevelOfDetail>) -> bool {
        if scale < self.scale {
            return false;
        }
        match coarser {
            Some(coarser) => scale < coarser.scale,
            None => true,
        }
    }
}

/// Finest level among `min..=max` whose scale range covers `scale`.
///
/// Scales finer than the finest level map to the finest level, so a map zoomed
/// further in than the pyramid still gets its most detailed clusters.
pub fn zoom_level_for_scale(scale: f64, min: ZoomLevel, max: ZoomLevel) -> Option<ZoomLevel> {
    if !scale.is_finite() || scale <= 0.0 || min > max {
        return None;
    }
    if scale < LevelOfDetail::web_mercator(max).scale {
        return Some(max);
    }

    (min..=max).rev().find(|&level| {
        let lod = LevelOfDetail::web_mercator(level);
        let coarser = (level > min).then(|| LevelOfDetail::web_mercator(level - 1));
        lod.scale_in_range(scale, coarser.as_ref())
    })
}
