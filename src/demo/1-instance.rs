//! Open a window and create a Vulkan instance.

use std::process::ExitCode;
use vk_triangle::Stage;

fn main() -> ExitCode {
    vk_triangle::run(Stage::Instance)
}
