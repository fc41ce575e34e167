//! Data command execution
//!
//! One execution path serves client requests, log replay on startup and
//! records streamed from a leader.

use super::error::{FerryError, Result};
use super::kv_store::KVStore;
use super::pubsub::PubSubRouter;
use crate::protocol::RespValue;

/// How a data command interacts with the append-only log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// No state change, never logged
    Read,
    /// Changes state, always logged
    Write,
    /// Has an effect (notifications) but no durable state; a leader logs
    /// it so followers see it, followers apply it without logging
    NonDurable,
}

impl CommandKind {
    /// Classify a lower-cased command name; `None` for non-data commands
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            "ping" | "get" | "exists" | "keys" | "dbsize" => Some(Self::Read),
            "set" | "del" | "incr" | "incrby" | "rename" | "flushdb" => Some(Self::Write),
            "publish" => Some(Self::NonDurable),
            _ => None,
        }
    }

    /// Whether a leader records the command in its log
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Whether a follower records the command in its own log
    pub fn is_durable(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// Whether a replicated record should be appended to the local log
pub fn is_durable_record(args: &[String]) -> bool {
    args.first()
        .and_then(|name| CommandKind::classify(&name.to_lowercase()))
        .is_some_and(CommandKind::is_durable)
}

/// In-memory data set: key/value store plus pub/sub router
#[derive(Clone, Default)]
pub struct Database {
    kv: KVStore,
    pubsub: PubSubRouter,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kv(&self) -> &KVStore {
        &self.kv
    }

    pub fn pubsub(&self) -> &PubSubRouter {
        &self.pubsub
    }

    /// Drop all data (used before rebuilding from the log)
    pub fn reset(&self) {
        self.kv.flush_all();
    }

    /// Execute one data command
    pub fn execute(&self, args: &[String]) -> Result<RespValue> {
        let Some(name) = args.first() else {
            return Err(FerryError::UnknownCommand(String::new()));
        };
        let name = name.to_lowercase();

        match name.as_str() {
            "ping" => match args.len() {
                1 => Ok(RespValue::Simple("PONG".to_string())),
                2 => Ok(RespValue::bulk(args[1].as_bytes())),
                _ => Err(FerryError::WrongArity(name)),
            },
            "get" => {
                expect_arity(&name, args, 2)?;
                Ok(self
                    .kv
                    .get(&args[1])
                    .map(RespValue::bulk)
                    .unwrap_or_else(RespValue::null))
            }
            "exists" => {
                if args.len() < 2 {
                    return Err(FerryError::WrongArity(name));
                }
                let count = args[1..].iter().filter(|key| self.kv.exists(key)).count();
                Ok(RespValue::Integer(count as i64))
            }
            "keys" => {
                if args.len() > 2 {
                    return Err(FerryError::WrongArity(name));
                }
                let prefix = args
                    .get(1)
                    .map(|pattern| pattern.trim_end_matches('*'))
                    .filter(|prefix| !prefix.is_empty());
                Ok(RespValue::string_array(self.kv.keys(prefix)))
            }
            "dbsize" => {
                expect_arity(&name, args, 1)?;
                Ok(RespValue::Integer(self.kv.len() as i64))
            }
            "set" => {
                expect_arity(&name, args, 3)?;
                self.kv.set(&args[1], args[2].as_bytes().to_vec());
                Ok(RespValue::ok())
            }
            "del" => {
                if args.len() < 2 {
                    return Err(FerryError::WrongArity(name));
                }
                Ok(RespValue::Integer(self.kv.delete(&args[1..]) as i64))
            }
            "incr" => {
                expect_arity(&name, args, 2)?;
                Ok(RespValue::Integer(self.kv.incr_by(&args[1], 1)?))
            }
            "incrby" => {
                expect_arity(&name, args, 3)?;
                let amount = args[2]
                    .parse::<i64>()
                    .map_err(|_| FerryError::InvalidArgument(args[2].clone()))?;
                Ok(RespValue::Integer(self.kv.incr_by(&args[1], amount)?))
            }
            "rename" => {
                expect_arity(&name, args, 3)?;
                self.kv.rename(&args[1], &args[2])?;
                Ok(RespValue::ok())
            }
            "flushdb" => {
                expect_arity(&name, args, 1)?;
                self.kv.flush_all();
                Ok(RespValue::ok())
            }
            "publish" => {
                expect_arity(&name, args, 3)?;
                let delivered = self.pubsub.publish(&args[1], args[2].as_bytes().to_vec());
                Ok(RespValue::Integer(delivered as i64))
            }
            _ => Err(FerryError::UnknownCommand(name)),
        }
    }
}

fn expect_arity(name: &str, args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(FerryError::WrongArity(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(CommandKind::classify("set"), Some(CommandKind::Write));
        assert_eq!(CommandKind::classify("get"), Some(CommandKind::Read));
        assert_eq!(
            CommandKind::classify("publish"),
            Some(CommandKind::NonDurable)
        );
        assert_eq!(CommandKind::classify("follow"), None);

        assert!(CommandKind::NonDurable.is_mutating());
        assert!(!CommandKind::NonDurable.is_durable());
        assert!(is_durable_record(&args(&["SET", "a", "1"])));
        assert!(!is_durable_record(&args(&["PUBLISH", "ch", "msg"])));
        assert!(!is_durable_record(&args(&["bogus"])));
    }

    #[test]
    fn test_execute_writes_and_reads() {
        let db = Database::new();

        assert_eq!(db.execute(&args(&["SET", "a", "1"])).unwrap(), RespValue::ok());
        assert_eq!(
            db.execute(&args(&["get", "a"])).unwrap(),
            RespValue::bulk("1")
        );
        assert_eq!(
            db.execute(&args(&["incrby", "a", "41"])).unwrap(),
            RespValue::Integer(42)
        );
        assert_eq!(
            db.execute(&args(&["del", "a", "b"])).unwrap(),
            RespValue::Integer(1)
        );
        assert_eq!(db.execute(&args(&["get", "a"])).unwrap(), RespValue::null());
        assert_eq!(
            db.execute(&args(&["dbsize"])).unwrap(),
            RespValue::Integer(0)
        );
    }

    #[test]
    fn test_keys_prefix_pattern() {
        let db = Database::new();
        db.execute(&args(&["set", "user:1", "a"])).unwrap();
        db.execute(&args(&["set", "other", "b"])).unwrap();

        assert_eq!(
            db.execute(&args(&["keys", "user:*"])).unwrap(),
            RespValue::string_array(["user:1"])
        );
        let RespValue::Array(Some(all)) = db.execute(&args(&["keys", "*"])).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_execute_errors() {
        let db = Database::new();

        assert!(matches!(
            db.execute(&args(&["set", "a"])),
            Err(FerryError::WrongArity(_))
        ));
        assert!(matches!(
            db.execute(&args(&["bogus"])),
            Err(FerryError::UnknownCommand(_))
        ));
        assert!(matches!(
            db.execute(&args(&["rename", "missing", "x"])),
            Err(FerryError::KeyNotFound)
        ));
    }

    #[test]
    fn test_publish_and_reset() {
        let db = Database::new();
        let _rx = db.pubsub().subscribe("events");

        assert_eq!(
            db.execute(&args(&["publish", "events", "hi"])).unwrap(),
            RespValue::Integer(1)
        );

        db.execute(&args(&["set", "a", "1"])).unwrap();
        db.reset();
        assert!(db.kv().is_empty());
    }
}
