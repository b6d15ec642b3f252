use std::fmt::Display;

use colored::Colorize;
use log::{Level, Metadata};

/// Dependencies only get to report problems
const DEPENDENCY_LEVELS: [Level; 2] = [Level::Warn, Level::Error];
const HITIT_LEVELS: [Level; 3] = [Level::Info, Level::Warn, Level::Error];

pub fn init_logger() {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_path(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_badge(record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(is_shown)
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized")
}

fn is_shown(meta: &Metadata) -> bool {
    let levels: &[Level] = match Target::from_path(meta.target()) {
        Target::External(_) => &DEPENDENCY_LEVELS,
        _ => &HITIT_LEVELS,
    };

    levels.contains(&meta.level())
}

#[derive(Debug, PartialEq)]
enum Target {
    External(String),
    Server,
    Collab,
    Core,
}

impl Target {
    /// Resolves a module path like `hitit_collab::rooms` to the crate it came from
    fn from_path(path: &str) -> Self {
        let krate = path.split("::").next().unwrap_or_default();

        match krate {
            "hitit_core" => Self::Core,
            "hitit_collab" => Self::Collab,
            "hitit_server" | "hitit" => Self::Server,
            other => Self::External(other.to_string()),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Server => "SERVER".bright_green(),
            Target::Collab => "COLLAB".bright_purple(),
            Target::Core => "CORE".blue(),
        };

        Display::fmt(&result, f)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use log::MetadataBuilder;

    use super::*;

    fn metadata(level: Level, target: &str) -> Metadata<'_> {
        MetadataBuilder::new().level(level).target(target).build()
    }

    #[test]
    fn resolves_targets() {
        assert_eq!(Target::from_path("hitit_collab::rooms"), Target::Collab);
        assert_eq!(Target::from_path("hitit_server"), Target::Server);
        assert_eq!(Target::from_path("hitit"), Target::Server);
        assert_eq!(
            Target::from_path("sqlx::query"),
            Target::External("sqlx".to_string())
        );
    }

    #[test]
    fn filters_by_origin() {
        assert!(is_shown(&metadata(Level::Info, "hitit_collab::versions")));
        assert!(!is_shown(&metadata(Level::Debug, "hitit_server")));
        assert!(!is_shown(&metadata(Level::Info, "sqlx::query")));
        assert!(is_shown(&metadata(Level::Warn, "sqlx::query")));
    }
}
