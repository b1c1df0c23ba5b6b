//! Stack traces of a local traced program, taken with gdb

use std::process::{Command, Stdio};

use eyre::WrapErr;

/// Attach gdb to `pid` and return the frames it prints
#[tracing::instrument]
pub fn backtrace(pid: u64) -> eyre::Result<Vec<String>> {
    let gdb = which::which("gdb").wrap_err("gdb not found in PATH")?;
    let output = Command::new(gdb)
        .args(["-batch", "-nx", "-ex", "backtrace", "-p"])
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .wrap_err("running gdb")?;
    if !output.status.success() {
        tracing::debug!(status = %output.status, "gdb exited unsuccessfully");
    }
    Ok(frames(&String::from_utf8_lossy(&output.stdout)))
}

// frame lines start with `#`; everything else is attach chatter
fn frames(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_frames_are_kept() {
        let output = "\
[Thread debugging using libthread_db enabled]
0x00007f3a1c2e4d3f in __GI___poll () from /lib/x86_64-linux-gnu/libc.so.6
#0  0x00007f3a1c2e4d3f in __GI___poll () from /lib/x86_64-linux-gnu/libc.so.6
#1  0x000055d0c1a0b2e4 in draw_scene () at demo.c:41
#2  0x000055d0c1a0b3f0 in main () at demo.c:88
[Inferior 1 (process 4242) detached]
";
        assert_eq!(
            frames(output),
            vec![
                "#0  0x00007f3a1c2e4d3f in __GI___poll () from /lib/x86_64-linux-gnu/libc.so.6",
                "#1  0x000055d0c1a0b2e4 in draw_scene () at demo.c:41",
                "#2  0x000055d0c1a0b3f0 in main () at demo.c:88",
            ]
        );
        assert!(frames("").is_empty());
    }
}
