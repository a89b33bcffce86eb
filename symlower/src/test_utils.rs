// SPDX-License-Identifier: Apache-2.0

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
