use chrono::Local;
use log::{Level, LevelFilter, SetLoggerError};
use colog::{basic_builder, format::{default_level_color, CologStyle}};

pub struct CustomPrefixToken;
impl CologStyle for CustomPrefixToken {
    fn prefix_token(&self, level: &Level) -> String {
        format!(
            "[{}] [{}]",
            default_level_color(level, level.as_str()),
            Local::now()
        )
    }
}

pub fn init_logging() -> Result<(), SetLoggerError> {
    let mut builder = basic_builder();
    builder.format(colog::formatter(CustomPrefixToken));
    builder.filter(None, LevelFilter::Debug);
    // candle is chatty during device setup
    builder.filter(Some("candle_core"), LevelFilter::Warn);
    builder.try_init()?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}
