//! Hard limits on input sizes and counts.

/// Maximum length of an owner id supplied by the identity provider.
pub const MAX_OWNER_ID_LEN: usize = 256;

/// Maximum confirmed appointments a single owner may hold at once.
pub const MAX_APPOINTMENTS_PER_OWNER: usize = 50;

/// Maximum number of date records in the store.
pub const MAX_DATES: usize = 3_660;

/// Maximum number of time slots in the daily catalog (one per minute).
pub const MAX_CATALOG_SLOTS: usize = 24 * 60;

/// Widest inclusive date range a single availability query may cover.
pub const MAX_QUERY_DAYS: i64 = 366;

/// Longest horizon a single seeding call may cover.
pub const MAX_HORIZON_DAYS: u32 = 3_660;
