/// Number of occurrence buckets in a 16-bit pixel histogram.
pub const HISTOGRAM_BUCKETS: usize = u16::MAX as usize + 1;

/// Bit depth of every sample written by the container writers.
pub const SAMPLE_BITS: u32 = 16;

/// Size of one FITS header card in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Longest string value a card holds between its quotes, escapes included.
pub const FITS_MAX_TEXT_LEN: usize = FITS_CARD_SIZE - 12;

/// FITS header and data units are padded to multiples of this many bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// Offset that maps unsigned 16-bit samples onto signed FITS `BITPIX = 16` data.
pub const FITS_BZERO: i32 = 32768;

/// FILETIME ticks between 1601-01-01 and the Unix epoch (100 ns units).
pub const FILETIME_UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;

/// Julian date of the Unix epoch.
pub const JULIAN_DATE_UNIX_EPOCH: f64 = 2_440_587.5;

/// Exposures shorter than this (seconds) treat the first live-view frame as
/// camera warm-up and do not record it.
pub const WARMUP_EXPOSURE_SECONDS: f64 = 1.0;

/// Default interval between camera reconnect checks at the end of a run.
pub const DEFAULT_RECONNECT_POLL_MS: u64 = 100;

/// Default pixel value above which a pixel counts toward the object centroid.
pub const DEFAULT_TARGET_PIXEL_THRESHOLD: u16 = 5000;

/// Default minimum time between two centroid-driven ROI updates.
pub const DEFAULT_ROI_REFRESH_MS: u64 = 500;

/// Default cadence for handing frames to the persistence sink for display.
pub const DEFAULT_PREVIEW_EVERY_NTH: u32 = 100;

/// Bytes per megabyte as used by the memory probe.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Number of MADs below/above the median used for preview stretching.
pub const PREVIEW_SHADOW_MADS: f64 = 2.8;
pub const PREVIEW_HIGHLIGHT_MADS: f64 = 12.0;
