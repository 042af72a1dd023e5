//! Addresses of modules, resources and resource instances, and the pattern
//! syntax used to select them.
//!
//! Concrete addresses always denote exactly one entry in a [`StateTree`]
//! (`crate::state::StateTree`). An [`AddressPattern`] may leave out the
//! module path or the instance key, and is resolved by the
//! [`Filter`](crate::filter::Filter).

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::PatternSyntaxError;

/// Distinguishes instances created by `count` or `for_each`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstanceKey {
    NoKey,
    Int(i64),
    Str(String),
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{}]", i),
            // JSON string syntax, so that quotes and backslashes are escaped
            InstanceKey::Str(s) => write!(f, "[{}]", serde_json::Value::String(s.clone())),
        }
    }
}

/// One `module.NAME[KEY]` step of a module instance path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleStep {
    pub name: String,
    pub key: InstanceKey,
}

impl Display for ModuleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module.{}{}", self.name, self.key)
    }
}

/// The path to a module instance. The empty path is the root module.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleInstance(pub Vec<ModuleStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        ModuleInstance(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[ModuleStep] {
        &self.0
    }

    pub fn child(&self, name: impl Into<String>, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleStep {
            name: name.into(),
            key,
        });
        ModuleInstance(steps)
    }

    /// Whether `other` is nested (at any depth) inside this module instance.
    /// A module instance is not its own ancestor.
    pub fn is_ancestor_of(&self, other: &ModuleInstance) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    pub fn resource(&self, resource: Resource) -> AbsResource {
        AbsResource {
            module: self.clone(),
            resource,
        }
    }
}

impl Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleInstance {
    type Err = PatternSyntaxError;

    /// Parses a module instance path as written in state documents. The empty
    /// string is the root module.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(ModuleInstance::root());
        }
        match s.parse::<AddressPattern>()? {
            AddressPattern::Module(m) => Ok(m),
            _ => Err(PatternSyntaxError::new(s, "not a module address")),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

/// A resource relative to its module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_: String,
    pub name: String,
}

impl Resource {
    pub fn managed(type_: impl Into<String>, name: impl Into<String>) -> Self {
        Resource {
            mode: ResourceMode::Managed,
            type_: type_.into(),
            name: name.into(),
        }
    }

    pub fn data(type_: impl Into<String>, name: impl Into<String>) -> Self {
        Resource {
            mode: ResourceMode::Data,
            type_: type_.into(),
            name: name.into(),
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_, self.name),
        }
    }
}

/// A resource within a specific module instance; denotes all of its instances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsResource {
    pub module: ModuleInstance,
    pub resource: Resource,
}

impl AbsResource {
    pub fn instance(&self, key: InstanceKey) -> AbsResourceInstance {
        AbsResourceInstance {
            resource: self.clone(),
            key,
        }
    }
}

impl Display for AbsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

/// A single instance of a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsResourceInstance {
    pub resource: AbsResource,
    pub key: InstanceKey,
}

impl Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

/// How much of the tree an address covers. Coarser granularities order first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    Module,
    Resource,
    Instance,
}

/// A concrete address at any of the three granularities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    Module(ModuleInstance),
    Resource(AbsResource),
    Instance(AbsResourceInstance),
}

impl Address {
    pub fn granularity(&self) -> Granularity {
        match self {
            Address::Module(_) => Granularity::Module,
            Address::Resource(_) => Granularity::Resource,
            Address::Instance(_) => Granularity::Instance,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Module(a) => a.fmt(f),
            Address::Resource(a) => a.fmt(f),
            Address::Instance(a) => a.fmt(f),
        }
    }
}

/// A user-supplied selection of state entries.
///
/// Resource and instance patterns without a module path (`module` is `None`)
/// are unqualified: they match the resource in every module instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPattern {
    Module(ModuleInstance),
    Resource {
        module: Option<ModuleInstance>,
        resource: Resource,
    },
    Instance {
        module: Option<ModuleInstance>,
        resource: Resource,
        key: InstanceKey,
    },
}

impl FromStr for AddressPattern {
    type Err = PatternSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser { input: s, pos: 0 }
            .pattern()
            .map_err(|reason| PatternSyntaxError::new(s, reason))
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.eat(c) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => Err(format!(
                    "expected '{}' at offset {}, found '{}'",
                    c, self.pos, found
                )),
                None => Err(format!("expected '{}' at end of address", c)),
            }
        }
    }

    fn ident(&mut self) -> Result<&'a str, String> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
            .map_or(rest.len(), |(i, _)| i);
        let ident = &rest[..len];
        match ident.chars().next() {
            None if rest.is_empty() => Err("expected a name at end of address".to_string()),
            None => Err(format!("expected a name at offset {}", self.pos)),
            Some(c) if c.is_ascii_digit() => Err(format!(
                "name {:?} at offset {} must not start with a digit",
                ident, self.pos
            )),
            Some(_) => {
                self.pos += len;
                Ok(ident)
            }
        }
    }

    /// `[0]` or `["name"]`; absent brackets yield `None`.
    fn key(&mut self) -> Result<Option<InstanceKey>, String> {
        if !self.eat('[') {
            return Ok(None);
        }
        let key = if self.peek() == Some('"') {
            InstanceKey::Str(self.string()?)
        } else {
            let rest = self.rest();
            let sign = usize::from(rest.starts_with('-'));
            let len = rest[sign..]
                .find(|c: char| !c.is_ascii_digit())
                .map_or(rest.len(), |i| i + sign);
            if len == sign {
                return Err(format!(
                    "expected an integer or quoted string key at offset {}",
                    self.pos
                ));
            }
            let n = rest[..len]
                .parse::<i64>()
                .map_err(|e| format!("invalid index {:?}: {}", &rest[..len], e))?;
            self.pos += len;
            InstanceKey::Int(n)
        };
        self.expect(']')?;
        Ok(Some(key))
    }

    /// A double-quoted string in JSON syntax, the form `InstanceKey`
    /// displays string keys in.
    fn string(&mut self) -> Result<String, String> {
        let start = self.pos;
        self.expect('"')?;
        loop {
            match self.peek() {
                None => return Err(format!("unterminated string starting at offset {}", start)),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => self.pos += c.len_utf8(),
                        None => {
                            return Err(format!("unterminated string starting at offset {}", start))
                        }
                    }
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }
        let quoted = &self.input[start..self.pos];
        serde_json::from_str::<String>(quoted)
            .map_err(|e| format!("invalid string {} at offset {}: {}", quoted, start, e))
    }

    fn pattern(mut self) -> Result<AddressPattern, String> {
        if self.input.is_empty() {
            return Err("empty address".to_string());
        }
        let mut steps = Vec::new();
        loop {
            let word = self.ident()?;
            if word == "module" {
                self.expect('.')?;
                let name = self.ident()?.to_string();
                let key = self.key()?.unwrap_or(InstanceKey::NoKey);
                steps.push(ModuleStep { name, key });
                if self.at_end() {
                    return Ok(AddressPattern::Module(ModuleInstance(steps)));
                }
                self.expect('.')?;
                continue;
            }

            let (mode, type_) = if word == "data" {
                self.expect('.')?;
                (ResourceMode::Data, self.ident()?)
            } else {
                (ResourceMode::Managed, word)
            };
            self.expect('.')?;
            let name = self.ident()?;
            let key = self.key()?;
            if !self.at_end() {
                return Err(format!(
                    "unexpected {:?} after resource address",
                    self.rest()
                ));
            }

            let resource = Resource {
                mode,
                type_: type_.to_string(),
                name: name.to_string(),
            };
            let module = if steps.is_empty() {
                None
            } else {
                Some(ModuleInstance(steps))
            };
            return Ok(match key {
                None => AddressPattern::Resource { module, resource },
                Some(key) => AddressPattern::Instance {
                    module,
                    resource,
                    key,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> AddressPattern {
        s.parse().unwrap()
    }

    #[test]
    fn parse_unqualified_resource() {
        assert_eq!(
            parse("aws_instance.web"),
            AddressPattern::Resource {
                module: None,
                resource: Resource::managed("aws_instance", "web"),
            }
        );
    }

    #[test]
    fn parse_data_resource_instance() {
        assert_eq!(
            parse("data.aws_ami.ubuntu[\"eu-west-1\"]"),
            AddressPattern::Instance {
                module: None,
                resource: Resource::data("aws_ami", "ubuntu"),
                key: InstanceKey::Str("eu-west-1".to_string()),
            }
        );
    }

    #[test]
    fn parse_nested_module() {
        let expected = ModuleInstance::root()
            .child("net", InstanceKey::Int(2))
            .child("subnet", InstanceKey::NoKey);
        assert_eq!(
            parse("module.net[2].module.subnet"),
            AddressPattern::Module(expected)
        );
    }

    #[test]
    fn parse_qualified_instance() {
        assert_eq!(
            parse("module.app.aws_instance.web[1]"),
            AddressPattern::Instance {
                module: Some(ModuleInstance::root().child("app", InstanceKey::NoKey)),
                resource: Resource::managed("aws_instance", "web"),
                key: InstanceKey::Int(1),
            }
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in [
            "",
            "aws_instance",
            "aws_instance.",
            "aws_instance.web[",
            "aws_instance.web[0",
            "aws_instance.web[\"a]",
            "aws_instance.web[-]",
            "aws_instance.web[1-]",
            "aws_instance.web[\"\\q\"]",
            "aws_instance.web.extra",
            "module.",
            "module.app.",
            "1abc.web",
            "aws_instance web",
        ] {
            let err = bad.parse::<AddressPattern>().unwrap_err();
            assert_eq!(err.pattern, bad);
        }
    }

    #[test]
    fn display_round_trips_through_parser() {
        let addr = ModuleInstance::root()
            .child("a", InstanceKey::Str("x\"y".to_string()))
            .resource(Resource::managed("null_resource", "n"))
            .instance(InstanceKey::Int(0));
        assert_eq!(addr.to_string(), "module.a[\"x\\\"y\"].null_resource.n[0]");
        match parse(&addr.to_string()) {
            AddressPattern::Instance {
                module: Some(m),
                resource,
                key,
            } => {
                assert_eq!(m, addr.resource.module);
                assert_eq!(resource, addr.resource.resource);
                assert_eq!(key, addr.key);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn module_instance_from_str() {
        assert_eq!(
            "".parse::<ModuleInstance>().unwrap(),
            ModuleInstance::root()
        );
        assert!("aws_instance.web".parse::<ModuleInstance>().is_err());
    }

    #[test]
    fn string_keys_accept_json_escapes() {
        for key in ["a\nb", "tab\there", "\u{1}", "quote\"back\\slash", "é"] {
            let module = ModuleInstance::root().child("m", InstanceKey::Str(key.to_string()));
            assert_eq!(module.to_string().parse::<ModuleInstance>().unwrap(), module);
        }
        assert_eq!(
            parse("aws_instance.web[\"\\u0041\\/\"]"),
            AddressPattern::Instance {
                module: None,
                resource: Resource::managed("aws_instance", "web"),
                key: InstanceKey::Str("A/".to_string()),
            }
        );
    }

    #[test]
    fn negative_keys_round_trip() {
        let addr = ModuleInstance::root()
            .child("m", InstanceKey::Int(-2))
            .resource(Resource::managed("null_resource", "n"))
            .instance(InstanceKey::Int(-1));
        assert_eq!(addr.to_string(), "module.m[-2].null_resource.n[-1]");
        assert_eq!(
            parse(&addr.to_string()),
            AddressPattern::Instance {
                module: Some(addr.resource.module.clone()),
                resource: addr.resource.resource.clone(),
                key: InstanceKey::Int(-1),
            }
        );
    }

    #[test]
    fn ancestry() {
        let a = ModuleInstance::root().child("a", InstanceKey::NoKey);
        let ab = a.child("b", InstanceKey::Int(0));
        assert!(ModuleInstance::root().is_ancestor_of(&a));
        assert!(a.is_ancestor_of(&ab));
        assert!(!a.is_ancestor_of(&a));
        assert!(!ab.is_ancestor_of(&a));
    }
}
