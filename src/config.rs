use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Runtime configuration of a channel and its codec.
///
/// Use the builder methods to customize, or [`Default`] for sensible
/// defaults. Settings can also be pushed in from a JSON sheet through
/// [`Configurator`].
///
/// # Examples
///
/// ```rust
/// use wirebus::Config;
///
/// let config = Config::default()
///     .with_max_frame_size(64 * 1024)   // Reject bodies above 64 KiB
///     .with_nodelay(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Largest accepted body, in bytes, in either direction.
    /// A frame announcing more is a protocol violation and closes the channel.
    /// Default: 4 MiB
    pub max_frame_size: usize,

    /// Initial capacity of the read buffer; it grows to fit larger frames.
    /// Default: 8 KiB
    pub read_buffer_size: usize,

    /// Disable send coalescing (`TCP_NODELAY`) on start.
    /// Default: true
    pub nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_frame_size: 4 * 1024 * 1024,
            read_buffer_size: 8 * 1024,
            nodelay: true,
        }
    }
}

impl Config {
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// Receives settings pushed by a [`Configurator`].
///
/// Every scalar found under the component's context is handed over as a
/// string through [`set_option`](Configurable::set_option), after which
/// [`configure`](Configurable::configure) runs once. Components interpret
/// only the keys they know.
pub trait Configurable {
    fn set_option(&mut self, key: &str, value: &str) -> Result<()>;

    /// Called after the whole context has been pushed.
    fn configure(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Configurable for Config {
    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "max_frame_size" => self.max_frame_size = parse(key, value)?,
            "read_buffer_size" => self.read_buffer_size = parse(key, value)?,
            "nodelay" => self.nodelay = parse(key, &value.to_ascii_lowercase())?,
            _ => warn!(key, "ignoring unknown channel setting"),
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(Error::Config {
                key: "max_frame_size".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::Config {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

/// Pushes a JSON settings sheet into subscribed components.
///
/// Top-level keys of the sheet name *contexts*. Each context can be claimed
/// by one [`Configurable`]; its scalar members are passed as strings.
///
/// ```rust
/// use wirebus::{Config, Configurator};
///
/// let mut channel = Config::default();
/// let mut cfg = Configurator::new();
/// cfg.subscribe("Channel", &mut channel);
/// cfg.run(r#"{ "Channel": { "max_frame_size": 1024, "nodelay": false } }"#)?;
/// drop(cfg);
///
/// assert_eq!(channel.max_frame_size, 1024);
/// assert!(!channel.nodelay);
/// # Ok::<(), wirebus::Error>(())
/// ```
#[derive(Default)]
pub struct Configurator<'a> {
    contexts: HashMap<String, &'a mut dyn Configurable>,
}

impl<'a> Configurator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `context` for `target`. A context already claimed is left as is.
    pub fn subscribe(&mut self, context: &str, target: &'a mut dyn Configurable) {
        if self.contexts.contains_key(context) {
            warn!(context, "configuration context is already registered");
            return;
        }
        debug!(context, "subscribed a configurable");
        self.contexts.insert(context.to_owned(), target);
    }

    pub fn is_subscribed(&self, context: &str) -> bool {
        self.contexts.contains_key(context)
    }

    /// Parses `sheet` and configures every subscribed context it mentions.
    pub fn run(&mut self, sheet: &str) -> Result<()> {
        let root: Value = serde_json::from_str(sheet)?;
        let Value::Object(root) = root else {
            return Err(Error::Config {
                key: "<root>".into(),
                reason: "configuration sheet must be a JSON object".into(),
            });
        };

        for (context, settings) in &root {
            let Some(target) = self.contexts.get_mut(context.as_str()) else {
                warn!(context = %context, "no configurable subscribed for context, skipping");
                continue;
            };
            let Value::Object(settings) = settings else {
                warn!(context = %context, "context is not an object, skipping");
                continue;
            };

            debug!(context = %context, "configuring");
            for (key, value) in settings {
                match scalar(value) {
                    Some(value) => target.set_option(key, &value)?,
                    None => warn!(context = %context, key = %key, "ignoring non-scalar setting"),
                }
            }
            target.configure()?;
        }
        Ok(())
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
