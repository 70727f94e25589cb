//! Playback slider mapping
//!
//! Maps a recorded `[start, end]` nanosecond range onto a bounded integer
//! scrub control: `time = base + value * factor`. `factor` is the smallest
//! integer that fits the range into `resolution` units, so
//! `value -> time -> value` is exact.

use contracts::{ContractError, PlaybackRange, Result, NANOS_PER_SECOND};

/// Affine slider <-> time mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderMapping {
    base_ns: u64,
    end_ns: u64,
    factor: u64,
    max: u64,
    single_step: u64,
    page_step: u64,
}

impl SliderMapping {
    /// Build the mapping for a recording
    ///
    /// # Errors
    /// `InvalidArgument` if `end_ns < start_ns` or `resolution` is 0.
    pub fn new(start_ns: u64, end_ns: u64, resolution: u32, tick_period_ns: u64) -> Result<Self> {
        if end_ns < start_ns {
            return Err(ContractError::invalid_argument(format!(
                "playback range ends before it starts ({start_ns} > {end_ns})"
            )));
        }
        if resolution == 0 {
            return Err(ContractError::invalid_argument("slider resolution must be positive"));
        }

        // Keep the value domain inside i32.
        let resolution = u64::from(resolution).min(i32::MAX as u64);
        let range = end_ns - start_ns;
        let factor = range.div_ceil(resolution).max(1);
        let max = range / factor;
        let single_step = (tick_period_ns / factor).max(1);
        let page_step = (NANOS_PER_SECOND / factor).max(single_step);

        Ok(Self {
            base_ns: start_ns,
            end_ns,
            factor,
            max,
            single_step,
            page_step,
        })
    }

    pub fn base_ns(&self) -> u64 {
        self.base_ns
    }

    pub fn end_ns(&self) -> u64 {
        self.end_ns
    }

    /// Nanoseconds per slider unit
    pub fn factor(&self) -> u64 {
        self.factor
    }

    pub fn max(&self) -> i32 {
        clamp_i32(self.max)
    }

    pub fn single_step(&self) -> i32 {
        clamp_i32(self.single_step)
    }

    pub fn page_step(&self) -> i32 {
        clamp_i32(self.page_step)
    }

    /// Slider value to absolute time; values are clamped to `[0, max]`
    pub fn time_from_slider(&self, value: i32) -> u64 {
        let value = u64::try_from(value).unwrap_or(0).min(self.max);
        self.base_ns + value * self.factor
    }

    /// Absolute time to slider value; times are clamped to the range
    pub fn slider_value_for_time(&self, timestamp_ns: u64) -> i32 {
        let offset = timestamp_ns.saturating_sub(self.base_ns);
        clamp_i32((offset / self.factor).min(self.max))
    }

    /// Slider value for a raw nanosecond timestamp typed as text
    ///
    /// # Errors
    /// `InvalidArgument` if the text is not an unsigned integer.
    pub fn slider_value_for_text(&self, text: &str) -> Result<i32> {
        let timestamp_ns = text.trim().parse::<u64>().map_err(|e| {
            ContractError::invalid_argument(format!("'{}' is not a timestamp: {e}", text.trim()))
        })?;
        Ok(self.slider_value_for_time(timestamp_ns))
    }

    /// Slider parameters for a value
    pub fn range(&self, slider_value: i32) -> PlaybackRange {
        PlaybackRange {
            start_ns: self.base_ns,
            end_ns: self.end_ns,
            slider_max: self.max(),
            slider_single_step: self.single_step(),
            slider_page_step: self.page_step(),
            slider_value,
        }
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
