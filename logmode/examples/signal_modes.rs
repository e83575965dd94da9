use std::{path::PathBuf, time::Duration};

use logmode::{Level, init_log_bridge, logger_config, record};

fn main() {
    let path = PathBuf::from("/tmp/logmode_example_signals.log");
    let _ = std::fs::remove_file(&path);

    let guard = logger_config()
        .with_log_file(&path)
        .with_signal_control(true)
        .init_global()
        .unwrap();
    init_log_bridge().unwrap();

    println!(
        "pid {}: `kill -USR1` for the next mode, `-USR2` for mode 0, `-HUP` to reopen {}",
        std::process::id(),
        path.display()
    );

    for i in 0..20 {
        for level in Level::ALL {
            let record = record!["msg" => "tick", "i" => i, "mode" => guard.current_mode()];
            logmode::log(level, &record).unwrap();
        }
        log::info!("bridged tick {i}");
        std::thread::sleep(Duration::from_millis(500));
        if i % 5 == 4 {
            guard.next_mode().unwrap();
        }
    }

    drop(guard);

    println!("\n--- Summary ---");
    println!(
        "{} records written to {}",
        std::fs::read_to_string(&path).unwrap().lines().count(),
        path.display()
    );
}
