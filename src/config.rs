/// Sampling parameters of one render call, replaced wholesale when changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Samples per pixel per dispatch.
    pub num_samples: u32,
    pub bounce_limit: u32,
}

impl Config {
    pub const PRESETS: [Config; 4] = [
        Config::new(1, 5),
        Config::new(4, 5),
        Config::new(16, 5),
        Config::new(32, 5),
    ];

    pub const fn new(num_samples: u32, bounce_limit: u32) -> Self {
        Self {
            num_samples,
            bounce_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::PRESETS[2]
    }
}
