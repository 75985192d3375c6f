//! Draw a colored triangle every frame until the window closes.

use std::process::ExitCode;
use vk_triangle::Stage;

fn main() -> ExitCode {
    vk_triangle::run(Stage::Triangle)
}
