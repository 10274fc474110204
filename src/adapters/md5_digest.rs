//! MD5 over the received firmware image (RustCrypto `md-5`).

use core::fmt::Write;

use md5::{Digest, Md5};

use crate::app::ports::DigestAccumulator;

#[derive(Default)]
pub struct Md5Digest {
    hasher: Md5,
}

impl Md5Digest {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigestAccumulator for Md5Digest {
    fn begin(&mut self) {
        self.hasher.reset();
    }

    fn add(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(&mut self) -> String {
        let out = self.hasher.finalize_reset();
        let mut hex = String::with_capacity(32);
        for b in out {
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}
