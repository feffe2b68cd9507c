use crate::{config::AppConfig, errors::RouteGraphError};

/// Parsed command line: settings overrides plus one command and its operands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    /// `--db PATH` and `--key=value` pairs, in the order given.
    pub overrides: Vec<(String, String)>,
    pub command: String,
    pub operands: Vec<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut overrides = Vec::new();
        let mut positional = Vec::new();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--db" | "--database" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?;
                    overrides.push(("db".to_string(), value.to_string()));
                }
                other if other.starts_with("--") => {
                    let (key, value) = other[2..]
                        .split_once('=')
                        .ok_or_else(|| format!("unknown flag {other}"))?;
                    if key.is_empty() {
                        return Err(format!("malformed override {other}"));
                    }
                    overrides.push((key.to_string(), value.to_string()));
                }
                other if other.starts_with('-') && other.len() > 1 => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => positional.push(arg.to_string()),
            }
        }
        let mut positional = positional.into_iter();
        let command = positional.next().unwrap_or_else(|| "status".to_string());
        let operands: Vec<String> = positional.collect();
        let expected = match command.as_str() {
            "status" | "clear" => 0,
            "load-metro" | "load-curriculum" | "roadmap" => 1,
            "route" | "hops" => 2,
            other => return Err(format!("unknown command {other}")),
        };
        if operands.len() != expected {
            return Err(format!(
                "{command} expects {expected} argument(s), got {}",
                operands.len()
            ));
        }
        Ok(Self {
            overrides,
            command,
            operands,
        })
    }

    /// Environment settings with this command line's overrides on top.
    pub fn resolve(&self, mut base: AppConfig) -> Result<AppConfig, RouteGraphError> {
        base.apply_overrides(&self.overrides)?;
        Ok(base)
    }

    pub fn operand(&self, idx: usize) -> &str {
        self.operands.get(idx).map(String::as_str).unwrap_or_default()
    }

    pub fn help() -> &'static str {
        "Usage: routegraph [--db memory|PATH] [--key=value ...] COMMAND [ARGS]\n\
         \n\
         Commands:\n\
         \x20 status                   node and edge counts\n\
         \x20 load-metro FILE          import a metro network document\n\
         \x20 load-curriculum FILE     import a curriculum document\n\
         \x20 route FROM TO            fastest route between two stations\n\
         \x20 hops FROM TO             route with the fewest stops\n\
         \x20 roadmap SLUG             prerequisites of a learning unit\n\
         \x20 clear                    remove every node and edge\n\
         \n\
         Settings (--key=value, or ROUTEGRAPH_* in the environment):\n\
         \x20 hop-ceiling, frontier-width, time-budget-ms, adjacency-cache\n"
    }
}
