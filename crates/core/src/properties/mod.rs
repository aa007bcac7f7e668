use serde::{Deserialize, Serialize};

/// A named, bounded numeric parameter that a UI can expose as a slider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub key: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl PropertyDescriptor {
    pub fn new(key: impl Into<String>, value: f32, min: f32, max: f32, step: f32) -> Self {
        Self {
            key: key.into(),
            value,
            min,
            max,
            step,
        }
    }

    pub fn accepts(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Nearest value on the `min + k * step` grid, kept inside `[min, max]`.
    /// Values already on the grid come back unchanged.
    pub fn snap(&self, value: f32) -> f32 {
        if self.step <= 0.0 {
            return value;
        }
        let snapped = (self.min + ((value - self.min) / self.step).round() * self.step)
            .clamp(self.min, self.max);
        if (snapped - value).abs() <= self.step * 1e-3 {
            value
        } else {
            snapped
        }
    }
}

/// Ordered bag of tunables owned by one visualization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyStore {
    descriptors: Vec<PropertyDescriptor>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property. Re-declaring a key replaces the earlier
    /// descriptor in place.
    pub fn declare(mut self, descriptor: PropertyDescriptor) -> Self {
        match self.descriptors.iter_mut().find(|d| d.key == descriptor.key) {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.descriptor(key).map(|d| d.value)
    }

    pub fn descriptor(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    /// Stores `value` snapped to the descriptor's step. Unknown keys,
    /// non-finite values and values outside `[min, max]` are ignored and
    /// reported as `false`.
    pub fn set(&mut self, key: &str, value: f32) -> bool {
        match self.descriptors.iter_mut().find(|d| d.key == key) {
            Some(descriptor) if descriptor.accepts(value) => {
                descriptor.value = descriptor.snap(value);
                true
            }
            _ => false,
        }
    }
}
