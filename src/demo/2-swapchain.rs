//! Create a surface, pick a GPU and build the swapchain.

use std::process::ExitCode;
use vk_triangle::Stage;

fn main() -> ExitCode {
    vk_triangle::run(Stage::Swapchain)
}
