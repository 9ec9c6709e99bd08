pub mod backfill;

pub use backfill::backfill;
