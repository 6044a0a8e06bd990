use crate::error;
use std::{panic, process, thread};

/// Configures the panic hook to halt the process on every panic.
///
/// Consensus code reports broken invariants, such as a corrupted coin cache or an unreadable
/// coin store, by panicking. The hook logs the failure and exits.
pub fn configure_panic() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let (file, line, column) = match panic_info.location() {
            Some(location) => (location.file(), location.line(), location.column()),
            None => ("unknown", 0, 0),
        };
        let message = panic_message(panic_info.payload());
        let current_thread = thread::current();
        let thread_name = current_thread.name().unwrap_or("<unnamed>");
        error!("thread '{}' panicked at {}:{}:{}: {}", thread_name, file, line, column, message);
        // The default hook may print additional info such as the backtrace
        default_hook(panic_info);
        eprintln!("Exiting...");
        process::exit(1);
    }));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    match payload.downcast_ref::<&str>() {
        Some(s) => s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.as_str(),
            None => "Box<dyn Any>",
        },
    }
}
