//! Entropy for packet headers.
//! 包头熵源。

use rand::RngCore;

/// A source of random 64-bit words.
///
/// 64位随机字的来源。
pub trait RandomSource: Send {
    fn rand_u64(&mut self) -> u64;
}

impl<R: RngCore + Send + ?Sized> RandomSource for R {
    fn rand_u64(&mut self) -> u64 {
        self.next_u64()
    }
}

/// Hands out random bits one at a time, drawing a fresh word every 64 bits.
///
/// 每次分发一个随机位，每64位重新抽取一个随机字。
pub struct BoolSource {
    random: Box<dyn RandomSource>,
    bit_bucket: u64,
    /// The next available bit. Zero means the bucket is empty.
    bit_mask: u64,
}

impl BoolSource {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Self {
            random,
            bit_bucket: 0,
            bit_mask: 0,
        }
    }

    /// Returns the next random bit from the bucket.
    /// 从桶中返回下一个随机位。
    pub fn rand_bool(&mut self) -> bool {
        if self.bit_mask == 0 {
            self.bit_bucket = self.random.rand_u64();
            self.bit_mask = 1;
        }
        let result = self.bit_bucket & self.bit_mask != 0;
        self.bit_mask <<= 1;
        result
    }
}

impl std::fmt::Debug for BoolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoolSource")
            .field("bit_mask", &self.bit_mask)
            .finish_non_exhaustive()
    }
}
