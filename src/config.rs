//! One-time configuration of the runtime parameters used by the reclamation
//! scheme.

mod generated {
    include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));
}

const DEFAULT_INITIAL_RETIRED_CAPACITY: usize = 128;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters for a thread's reclaimer, consumed via
/// [`init_config`](crate::init_config).
#[derive(Copy, Clone, Debug)]
pub struct Config {
    scan_threshold_k_per_256: u32,
    initial_retired_capacity: usize,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl Config {
    /// Creates a new [`Config`] with the given parameters.
    ///
    /// # Panics
    ///
    /// Panics if `scan_threshold_k_per_256` is 0.
    #[inline]
    pub fn with_params(scan_threshold_k_per_256: u32, initial_retired_capacity: usize) -> Self {
        assert!(scan_threshold_k_per_256 > 0, "scan threshold ratio must be greater than 0");
        Self { scan_threshold_k_per_256, initial_retired_capacity }
    }

    /// Returns the initial capacity reserved for a thread's retire set.
    #[inline]
    pub fn initial_retired_capacity(&self) -> usize {
        self.initial_retired_capacity
    }

    /// Returns the scan-threshold ratio `K`, expressed as a numerator over
    /// 256.
    #[inline]
    pub fn scan_threshold_k_per_256(&self) -> u32 {
        self.scan_threshold_k_per_256
    }

    /// The number of retired records that must accumulate, given a registry
    /// of `registry_len` slots, before a scan is triggered. Implements the
    /// `retired_set_len > K * H` gate.
    #[inline]
    pub(crate) fn scan_threshold(&self, registry_len: usize) -> usize {
        (registry_len * self.scan_threshold_k_per_256 as usize) / 256
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
///
/// This is mainly useful for keeping stability, in case the internal
/// structure of [`Config`] changes in the future, e.g. because further
/// parameters are added.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    scan_threshold_k_per_256: Option<u32>,
    initial_retired_capacity: Option<usize>,
}

impl ConfigBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scan-threshold ratio `K` (numerator over 256). The reference
    /// design uses `K ≈ 4.25`, i.e. `1088 / 256`.
    #[inline]
    pub fn scan_threshold_k_per_256(mut self, k: u32) -> Self {
        self.scan_threshold_k_per_256 = Some(k);
        self
    }

    /// Sets the initial capacity reserved for a newly spawned thread's
    /// retire set.
    #[inline]
    pub fn initial_retired_capacity(mut self, capacity: usize) -> Self {
        self.initial_retired_capacity = Some(capacity);
        self
    }

    /// Consumes the builder and returns an initialized [`Config`].
    ///
    /// Unspecified parameters default to [`generated::SCAN_THRESHOLD_K_PER_256`]
    /// (itself overridable at build time via the `HAZQUEUE_SCAN_K_PER_256`
    /// environment variable) and [`DEFAULT_INITIAL_RETIRED_CAPACITY`].
    #[inline]
    pub fn build(self) -> Config {
        Config::with_params(
            self.scan_threshold_k_per_256.unwrap_or(generated::SCAN_THRESHOLD_K_PER_256),
            self.initial_retired_capacity.unwrap_or(DEFAULT_INITIAL_RETIRED_CAPACITY),
        )
    }
}
