// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::{str::FromStr, time::Duration};

/// Four character code identifying a pixel format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

/// RGB 24-bit pixel format (8 bits per channel, no alpha)
pub const RGB3: FourCC = FourCC(*b"RGB3");

/// RGBX 32-bit pixel format (8 bits per channel, unused alpha)
pub const RGBX: FourCC = FourCC(*b"RGBX");

/// RGBA 32-bit pixel format (8 bits per channel, with alpha)
pub const RGBA: FourCC = FourCC(*b"RGBA");

/// YUYV 4:2:2 YUV packed format (common camera output format)
pub const YUYV: FourCC = FourCC(*b"YUYV");

/// NV12 4:2:0 YUV semi-planar format (efficient for video encoding)
pub const NV12: FourCC = FourCC(*b"NV12");

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in self.0 {
            write!(f, "{}", c as char)?;
        }
        Ok(())
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("fourcc must be exactly 4 characters: {s:?}"))?;
        let fourcc = FourCC(bytes);
        if frame_size(1, 2, fourcc).is_none() {
            return Err(format!("unsupported pixel format: {fourcc}"));
        }
        Ok(fourcc)
    }
}

const fn format_row_stride(format: FourCC, width: u32) -> Option<usize> {
    match format {
        RGB3 => Some(3 * width as usize),
        RGBX | RGBA => Some(4 * width as usize),
        YUYV => Some(2 * width as usize),
        NV12 => Some(width as usize / 2 + width as usize),
        _ => None,
    }
}

/// Size in bytes of one `width`x`height` frame in `format`, or `None` if the
/// format is not supported.
pub const fn frame_size(width: u32, height: u32, format: FourCC) -> Option<usize> {
    match format_row_stride(format, width) {
        Some(stride) => Some(stride * height as usize),
        None => None,
    }
}

/// A single captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Position of the frame in the source's output, starting at 0
    pub sequence: u64,
    /// Capture time relative to when the source was opened
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    pub data: Vec<u8>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{} {}x{} {} {}B @{:.3?}",
            self.sequence,
            self.width,
            self.height,
            self.format,
            self.data.len(),
            self.timestamp
        )
    }
}
