use {
    log::LevelFilter,
    std::{env, str::FromStr, time::SystemTime},
};

/// Console logging for examples and headless renders. `RUST_LOG` names a
/// plain level ("debug", "trace", ...). Scene compilation and kernel
/// dispatch log at debug, so the default info level reports only device
/// selection and render timings.
pub fn setup_logger() -> Result<(), fern::InitError> {
    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| LevelFilter::from_str(&value).ok())
        .unwrap_or(LevelFilter::Info);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:>5} {} {}",
                humantime::format_rfc3339_seconds(SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;

    Ok(())
}
