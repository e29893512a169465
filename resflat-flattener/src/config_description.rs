// Copyright 2024 Google LLC
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

use deku::prelude::*;

/// Device configuration descriptor as the runtime loader stores it: a
/// fixed 64-byte little-endian struct at the head of every type chunk.
///
/// The derived `Ord` gives the deterministic iteration order used when a
/// type is emitted once per distinct configuration, and doubles as the
/// configuration component of the value string pool sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DekuWrite)]
pub struct ConfigDescription {
    /// Total byte size of this struct on disk. Always 64.
    pub size: u32,
    pub mcc: u16,
    pub mnc: u16,
    /// ISO-639-1 language code, packed; \0\0 means "any".
    pub language: [u8; 2],
    /// ISO-3166-1 region code, packed; \0\0 means "any".
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub input_pad0: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
    pub screen_config_pad2: u16,
    pub reserved: [u8; 12]
}

impl Default for ConfigDescription {
    fn default() -> Self {
        ConfigDescription {
            size: 64,
            mcc: 0,
            mnc: 0,
            language: [0; 2],
            country: [0; 2],
            orientation: 0,
            touchscreen: 0,
            density: 0,
            keyboard: 0,
            navigation: 0,
            input_flags: 0,
            input_pad0: 0,
            screen_width: 0,
            screen_height: 0,
            sdk_version: 0,
            minor_version: 0,
            screen_layout: 0,
            ui_mode: 0,
            smallest_screen_width_dp: 0,
            screen_width_dp: 0,
            screen_height_dp: 0,
            locale_script: [0; 4],
            locale_variant: [0; 8],
            screen_layout2: 0,
            color_mode: 0,
            screen_config_pad2: 0,
            reserved: [0; 12]
        }
    }
}

impl ConfigDescription {
    // Configuration axis bits, as the loader's config-matching code
    // expects them in type-spec masks.
    pub const CONFIG_MCC: u32 = 0x0001;
    pub const CONFIG_MNC: u32 = 0x0002;
    pub const CONFIG_LOCALE: u32 = 0x0004;
    pub const CONFIG_TOUCHSCREEN: u32 = 0x0008;
    pub const CONFIG_KEYBOARD: u32 = 0x0010;
    pub const CONFIG_KEYBOARD_HIDDEN: u32 = 0x0020;
    pub const CONFIG_NAVIGATION: u32 = 0x0040;
    pub const CONFIG_ORIENTATION: u32 = 0x0080;
    pub const CONFIG_DENSITY: u32 = 0x0100;
    pub const CONFIG_SCREEN_SIZE: u32 = 0x0200;
    pub const CONFIG_VERSION: u32 = 0x0400;
    pub const CONFIG_SCREEN_LAYOUT: u32 = 0x0800;
    pub const CONFIG_UI_MODE: u32 = 0x1000;
    pub const CONFIG_SMALLEST_SCREEN_SIZE: u32 = 0x2000;
    pub const CONFIG_LAYOUTDIR: u32 = 0x4000;
    pub const CONFIG_SCREEN_ROUND: u32 = 0x8000;
    pub const CONFIG_COLOR_MODE: u32 = 0x0001_0000;

    // Sub-field masks for axes that share a byte
    const MASK_KEYSHIDDEN: u8 = 0x03;
    const MASK_LAYOUTDIR: u8 = 0xC0;
    const MASK_SCREENROUND: u8 = 0x03;

    /// Returns the set of configuration axes on which `self` and `other`
    /// differ, as CONFIG_* bits. Symmetric.
    pub fn diff(&self, other: &ConfigDescription) -> u32 {
        let mut bits = 0;
        if self.mcc != other.mcc {
            bits |= Self::CONFIG_MCC;
        }
        if self.mnc != other.mnc {
            bits |= Self::CONFIG_MNC;
        }
        if self.language != other.language
            || self.country != other.country
            || self.locale_script != other.locale_script
            || self.locale_variant != other.locale_variant
        {
            bits |= Self::CONFIG_LOCALE;
        }
        if self.touchscreen != other.touchscreen {
            bits |= Self::CONFIG_TOUCHSCREEN;
        }
        if self.keyboard != other.keyboard {
            bits |= Self::CONFIG_KEYBOARD;
        }
        if (self.input_flags ^ other.input_flags) & Self::MASK_KEYSHIDDEN != 0 {
            bits |= Self::CONFIG_KEYBOARD_HIDDEN;
        }
        if self.navigation != other.navigation {
            bits |= Self::CONFIG_NAVIGATION;
        }
        if self.orientation != other.orientation {
            bits |= Self::CONFIG_ORIENTATION;
        }
        if self.density != other.density {
            bits |= Self::CONFIG_DENSITY;
        }
        if self.screen_width != other.screen_width
            || self.screen_height != other.screen_height
            || self.screen_width_dp != other.screen_width_dp
            || self.screen_height_dp != other.screen_height_dp
        {
            bits |= Self::CONFIG_SCREEN_SIZE;
        }
        if self.sdk_version != other.sdk_version || self.minor_version != other.minor_version {
            bits |= Self::CONFIG_VERSION;
        }
        if (self.screen_layout ^ other.screen_layout) & !Self::MASK_LAYOUTDIR != 0 {
            bits |= Self::CONFIG_SCREEN_LAYOUT;
        }
        if (self.screen_layout ^ other.screen_layout) & Self::MASK_LAYOUTDIR != 0 {
            bits |= Self::CONFIG_LAYOUTDIR;
        }
        if (self.screen_layout2 ^ other.screen_layout2) & Self::MASK_SCREENROUND != 0 {
            bits |= Self::CONFIG_SCREEN_ROUND;
        }
        if self.color_mode != other.color_mode {
            bits |= Self::CONFIG_COLOR_MODE;
        }
        if self.ui_mode != other.ui_mode {
            bits |= Self::CONFIG_UI_MODE;
        }
        if self.smallest_screen_width_dp != other.smallest_screen_width_dp {
            bits |= Self::CONFIG_SMALLEST_SCREEN_SIZE;
        }
        bits
    }

    /// True for the all-zero "default" configuration that matches any
    /// device.
    pub fn is_default(&self) -> bool {
        *self == ConfigDescription::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deku::DekuContainerWrite;

    fn landscape() -> ConfigDescription {
        ConfigDescription {
            orientation: 2,
            ..Default::default()
        }
    }

    #[test]
    fn flattens_to_64_bytes() {
        let bytes = ConfigDescription::default().to_bytes().unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..4], &[64, 0, 0, 0]);
        assert!(bytes[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn density_only_diff_sets_exactly_the_density_bit() {
        let default = ConfigDescription::default();
        let hdpi = ConfigDescription {
            density: 240,
            ..Default::default()
        };
        assert_eq!(default.diff(&hdpi), ConfigDescription::CONFIG_DENSITY);
        assert_eq!(hdpi.diff(&default), ConfigDescription::CONFIG_DENSITY);
    }

    #[test]
    fn diff_accumulates_multiple_axes() {
        let land_v21 = ConfigDescription {
            orientation: 2,
            sdk_version: 21,
            ..Default::default()
        };
        assert_eq!(
            ConfigDescription::default().diff(&land_v21),
            ConfigDescription::CONFIG_ORIENTATION | ConfigDescription::CONFIG_VERSION
        );
    }

    #[test]
    fn layout_direction_bits_diff_separately_from_screen_layout() {
        let rtl = ConfigDescription {
            screen_layout: 0x80,
            ..Default::default()
        };
        let large = ConfigDescription {
            screen_layout: 0x03,
            ..Default::default()
        };
        assert_eq!(ConfigDescription::default().diff(&rtl), ConfigDescription::CONFIG_LAYOUTDIR);
        assert_eq!(
            ConfigDescription::default().diff(&large),
            ConfigDescription::CONFIG_SCREEN_LAYOUT
        );
    }

    #[test]
    fn identical_configs_have_empty_diff() {
        assert_eq!(landscape().diff(&landscape()), 0);
    }

    #[test]
    fn default_config_ordering_comes_first() {
        assert!(ConfigDescription::default() < landscape());
        assert!(ConfigDescription::default().is_default());
        assert!(!landscape().is_default());
    }
}
