//! Raster dimension constraints of native platforms

use serde::Serialize;

use crate::error::{Error, Result};

/// Dimension rules a native platform imposes on its rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SizeRules {
    pub power_of_two: bool,
    pub square: bool,
    pub multiple_of: Option<u32>,
    pub maximum: Option<u32>,
    pub minimum: Option<u32>,
}

impl SizeRules {
    /// Rules that accept anything.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            power_of_two: false,
            square: false,
            multiple_of: None,
            maximum: None,
            minimum: None,
        }
    }

    #[must_use]
    pub const fn power_of_two() -> Self {
        Self {
            power_of_two: true,
            ..Self::any()
        }
    }

    #[must_use]
    pub const fn with_maximum(mut self, maximum: u32) -> Self {
        self.maximum = Some(maximum);
        self
    }

    #[must_use]
    pub const fn with_minimum(mut self, minimum: u32) -> Self {
        self.minimum = Some(minimum);
        self
    }

    #[must_use]
    pub const fn squared(mut self) -> Self {
        self.square = true;
        self
    }

    #[must_use]
    pub const fn multiple(mut self, k: u32) -> Self {
        self.multiple_of = Some(k);
        self
    }

    /// The first rule `width` x `height` violates.
    fn violation(&self, width: u32, height: u32) -> Option<String> {
        if width == 0 || height == 0 {
            return Some("dimensions must be non-zero".to_string());
        }
        if self.power_of_two && (!width.is_power_of_two() || !height.is_power_of_two()) {
            return Some("dimensions must be powers of two".to_string());
        }
        if self.square && width != height {
            return Some("raster must be square".to_string());
        }
        if let Some(k) = self.multiple_of
            && (width % k != 0 || height % k != 0)
        {
            return Some(format!("dimensions must be multiples of {k}"));
        }
        if let Some(max) = self.maximum
            && (width > max || height > max)
        {
            return Some(format!("dimensions must not exceed {max}"));
        }
        if let Some(min) = self.minimum
            && (width < min || height < min)
        {
            return Some(format!("dimensions must be at least {min}"));
        }
        None
    }

    /// True if the dimensions satisfy every rule.
    #[must_use]
    pub fn verify(&self, width: u32, height: u32) -> bool {
        self.violation(width, height).is_none()
    }

    /// Like [`verify`](Self::verify) but reports the violated rule.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDimension`] naming the first violated rule.
    pub fn check(&self, width: u32, height: u32) -> Result<()> {
        match self.violation(width, height) {
            None => Ok(()),
            Some(reason) => Err(Error::InvalidDimension {
                width,
                height,
                reason,
            }),
        }
    }

    /// Closest dimensions that satisfy the rules.
    #[must_use]
    pub fn adjust(&self, width: u32, height: u32) -> (u32, u32) {
        let (mut w, mut h) = (width.max(1), height.max(1));
        if self.square {
            let side = w.max(h);
            w = side;
            h = side;
        }
        if self.power_of_two {
            w = nearest_power_of_two(w);
            h = nearest_power_of_two(h);
        }
        if let Some(k) = self.multiple_of.filter(|&k| k > 1) {
            w = w.div_ceil(k) * k;
            h = h.div_ceil(k) * k;
        }
        if let Some(max) = self.maximum {
            w = w.min(max);
            h = h.min(max);
        }
        if let Some(min) = self.minimum {
            w = w.max(min);
            h = h.max(min);
        }
        (w, h)
    }
}

fn nearest_power_of_two(value: u32) -> u32 {
    if value.is_power_of_two() {
        return value;
    }
    let upper = value.next_power_of_two();
    let lower = upper / 2;
    if value - lower < upper - value { lower } else { upper }
}
