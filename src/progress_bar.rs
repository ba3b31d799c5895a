pub use crate::traits::Progress;

/// Progress bar that adapts to the output
///
/// On an interactive terminal this is an `indicatif` bar, otherwise a
/// `logbar` bar. Nothing is shown unless the log level is exactly `info`.
/// While a bar is visible, logging is suspended so the bar is not
/// overwritten.
pub enum ProgressBar {
    Hidden,
    Terminal(indicatif::ProgressBar),
    Log(logbar::ProgressBar),
}

impl ProgressBar {
    /// A new progress bar with the given maximum progress and message
    pub fn new(len: u64, message: &str) -> Self {
        if log::max_level().to_level() != Some(log::Level::Info) {
            return Self::Hidden;
        }
        let bar = if console::Term::stderr().features().is_attended() {
            let bar = indicatif::ProgressBar::new(len);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{bar:60.cyan/cyan} {msg} {pos}/{len} [{elapsed}]")
            {
                bar.set_style(style);
            }
            bar.set_message(message.to_owned());
            Self::Terminal(bar)
        } else {
            eprintln!("{message}");
            let style = logbar::Style::new().indicator('█');
            Self::Log(logbar::ProgressBar::with_style(len as usize, style))
        };
        log::set_max_level(log::LevelFilter::Off);
        bar
    }
}

impl Progress for ProgressBar {
    fn inc(&self, i: u64) {
        match self {
            Self::Hidden => {}
            Self::Terminal(bar) => bar.inc(i),
            Self::Log(bar) => bar.inc(i as usize),
        }
    }

    fn finish(&self) {
        match self {
            Self::Hidden => return,
            Self::Terminal(bar) => bar.finish(),
            Self::Log(bar) => bar.finish(),
        }
        log::set_max_level(log::LevelFilter::Info);
    }
}
