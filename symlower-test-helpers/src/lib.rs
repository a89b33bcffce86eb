// SPDX-License-Identifier: Apache-2.0

pub mod expr_fuzz;
pub mod expr_interp;

/// Installs a test logger; safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
