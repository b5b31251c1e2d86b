// weights.rs: flat weight table addressed by masked feature index
/// Weights indexed by `index & mask`. The length is always a power of two.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    weights: Vec<f32>,
    mask: u32,
    stride_shift: u32,
}

impl WeightVector {
    /// A zeroed table of `2^(bits + stride_shift)` slots; `None` if that
    /// does not fit a 32-bit index.
    pub fn new(bits: u32, stride_shift: u32) -> Option<Self> {
        let total = bits.checked_add(stride_shift).filter(|t| *t <= 32)?;
        let len = 1usize.checked_shl(total)?;
        Self::from_vec(vec![0.0; len], stride_shift)
    }

    /// Wrap existing weights. `None` unless the length is a nonzero power of
    /// two holding at least one full stride.
    pub fn from_vec(weights: Vec<f32>, stride_shift: u32) -> Option<Self> {
        let len = weights.len();
        if len == 0 || !len.is_power_of_two() {
            return None;
        }
        let stride = 1usize.checked_shl(stride_shift).filter(|_| stride_shift < 32)?;
        if stride > len {
            return None;
        }
        let mask = u32::try_from(len - 1).ok()?;
        Some(Self { weights, mask, stride_shift })
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn stride_shift(&self) -> u32 {
        self.stride_shift
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[inline]
    pub fn get(&self, index: u32) -> f32 {
        self.weights[(index & self.mask) as usize]
    }

    #[inline]
    pub fn set(&mut self, index: u32, w: f32) {
        self.weights[(index & self.mask) as usize] = w;
    }

    /// Zero the slot and return what was there, or `None` if it was already zero.
    #[inline]
    pub fn take_nonzero(&mut self, index: u32) -> Option<f32> {
        let slot = &mut self.weights[(index & self.mask) as usize];
        if *slot == 0.0 {
            return None;
        }
        Some(std::mem::replace(slot, 0.0))
    }

    pub fn count_nonzero(&self) -> usize {
        self.weights.iter().filter(|w| **w != 0.0).count()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.weights
    }
}
