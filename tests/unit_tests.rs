//! Component-level tests collected under `tests/unit/`.

mod unit;
