//! Nachos Simulator
//!
//! Boots the kernel on the mock machine and runs a small program tree:
//! `shell` prints a banner, forks a `ticker`, execs `echo` (which reads one
//! console line and writes it back) and joins it.
//!
//! Environment:
//! - `NOS_CONFIG`: path to a JSON `KernelConfig`
//! - `NOS_INPUT`: console input (default `hello nachos\n`)

use std::error::Error;
use std::sync::Arc;

use nos_hal::HAL;
use nos_hal_mock::{MockHal, UserContext};
use nos_kernel::syscall::{SC_EXEC, SC_EXIT, SC_FORK, SC_JOIN, SC_PREDICT_BURST, SC_READ, SC_WRITE, SC_YIELD};
use nos_kernel::{Kernel, KernelConfig, CONSOLE_INPUT, CONSOLE_OUTPUT};

const NAME_ADDR: u32 = 0x40;
const BUF_ADDR: u32 = 0x100;
const LINE_MAX: i32 = 64;

fn put(ctx: &mut UserContext<'_, '_>, text: &[u8]) {
    ctx.write_bytes(BUF_ADDR, text);
    ctx.syscall(SC_WRITE, [BUF_ADDR as i32, text.len() as i32, CONSOLE_OUTPUT, 0]);
}

fn shell(ctx: &mut UserContext<'_, '_>) {
    if ctx.fork_entry().is_some() {
        ticker(ctx);
        return;
    }
    put(ctx, b"nachos shell\n");
    ctx.syscall(SC_FORK, [0x200, 0, 0, 0]);

    ctx.write_cstr(NAME_ADDR, "echo");
    let child = ctx.syscall(SC_EXEC, [NAME_ADDR as i32, 0, 0, 0]);
    if child < 0 {
        put(ctx, b"exec failed\n");
        ctx.syscall(SC_EXIT, [1, 0, 0, 0]);
        return;
    }
    ctx.syscall(SC_JOIN, [child, 0, 0, 0]);
    put(ctx, b"bye\n");
    ctx.syscall(SC_EXIT, [0, 0, 0, 0]);
}

fn ticker(ctx: &mut UserContext<'_, '_>) {
    for burst in [30, 20, 10] {
        ctx.syscall(SC_PREDICT_BURST, [burst, 0, 0, 0]);
        ctx.syscall(SC_YIELD, [0; 4]);
    }
    ctx.syscall(SC_EXIT, [0, 0, 0, 0]);
}

fn echo(ctx: &mut UserContext<'_, '_>) {
    let n = ctx.syscall(SC_READ, [BUF_ADDR as i32, LINE_MAX, CONSOLE_INPUT, 0]);
    if n > 0 {
        ctx.syscall(SC_WRITE, [BUF_ADDR as i32, n, CONSOLE_OUTPUT, 0]);
    }
    ctx.syscall(SC_EXIT, [n, 0, 0, 0]);
}

fn load_config() -> Result<KernelConfig, Box<dyn Error>> {
    match std::env::var("NOS_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        Err(_) => Ok(KernelConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    let input = std::env::var("NOS_INPUT").unwrap_or_else(|_| String::from("hello nachos\n"));

    let hal = Arc::new(MockHal::new());
    hal.install_program("shell", shell);
    hal.install_program("echo", echo);
    hal.console_device().push_input(input.as_bytes());

    let kernel = Kernel::boot_with_config(Arc::clone(&hal), config);
    let shell_id = kernel.spawn_top_level("shell")?;
    hal.wait_idle();

    println!("── console ─────────────────────────────");
    print!("{}", hal.console_device().output_string());
    println!("── kernel log ──────────────────────────");
    for line in hal.get_debug_log() {
        println!("{}", line);
    }
    println!("── summary ─────────────────────────────");
    println!(
        "shell {} exited with {:?} after {} ticks",
        shell_id,
        kernel.directory().is_exited(shell_id),
        hal.now_ticks()
    );
    println!("metrics: {}", serde_json::to_string(&kernel.metrics())?);
    println!("audit events: {}", kernel.syslog().len());
    Ok(())
}
