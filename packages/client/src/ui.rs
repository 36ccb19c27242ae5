//! UI utilities for the console.

use std::io::Write;

/// 入力行のプロンプト
pub const PROMPT: &str = "carrera> ";

/// Print lines above the prompt and redisplay it
pub fn print_lines(lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "\r{}", line).ok();
    }
    write!(stdout, "{}", PROMPT).ok();
    stdout.flush().ok();
}
