//! Declared parameter descriptors and call binding.
//!
//! Rust has no runtime signature introspection, so the calling convention
//! of a traced function is declared explicitly: an ordered list of tagged
//! parameter descriptors, validated once and reused for every call.
//! Binding resolves a concrete call's arguments against the descriptors
//! into an ordered name-to-value map covering every declared parameter,
//! the variadic tuple, and the keyword bag.

use crate::{Error, Result, Value};
use indexmap::IndexMap;

/// How a declared parameter consumes call arguments.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// An ordinary named parameter, filled positionally or by keyword.
    Positional {
        /// Value used when the call supplies nothing for this parameter.
        default: Option<Value>,
    },
    /// Collects surplus positional arguments into an ordered tuple.
    Variadic,
    /// Collects surplus keyword arguments into an ordered mapping.
    KeywordBag,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    kind: ParamKind,
}

impl Param {
    /// A required positional parameter.
    pub fn positional(name: &str) -> Self {
        Self { name: name.to_string(), kind: ParamKind::Positional { default: None } }
    }

    /// A positional parameter with a default value.
    pub fn with_default(name: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Positional { default: Some(default) },
        }
    }

    /// The variadic parameter collecting surplus positional arguments.
    pub fn variadic(name: &str) -> Self {
        Self { name: name.to_string(), kind: ParamKind::Variadic }
    }

    /// The keyword-bag parameter collecting surplus keyword arguments.
    pub fn keyword_bag(name: &str) -> Self {
        Self { name: name.to_string(), kind: ParamKind::KeywordBag }
    }

    /// Declared name of this parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind tag of this parameter.
    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    /// Default value, for positional parameters that declare one.
    pub fn default(&self) -> Option<&Value> {
        match &self.kind {
            ParamKind::Positional { default } => default.as_ref(),
            _ => None,
        }
    }
}

/// The declared calling convention of a traced function.
///
/// # Examples
///
/// ```
/// # use symtrace::{Param, Signature, Value};
/// let sig = Signature::new([
///     Param::positional("x"),
///     Param::with_default("y", Value::from(2.0)),
///     Param::variadic("rest"),
/// ]).unwrap();
/// assert_eq!(sig.varargs_name(), Some("rest"));
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    positionals: Vec<Param>,
    varargs: Option<String>,
    keywords: Option<String>,
}

impl Signature {
    /// Validate a parameter-descriptor list.
    ///
    /// Names must be unique; defaults may only appear on a contiguous tail
    /// of the positional parameters; at most one variadic and one
    /// keyword-bag parameter may appear, in that order, after all
    /// positionals.
    pub fn new(params: impl IntoIterator<Item = Param>) -> Result<Self> {
        let mut positionals: Vec<Param> = Vec::new();
        let mut varargs = None;
        let mut keywords = None;
        let mut seen_default = false;

        for param in params {
            let name = param.name.clone();
            if positionals.iter().any(|p| p.name == name)
                || varargs.as_deref() == Some(name.as_str())
                || keywords.as_deref() == Some(name.as_str())
            {
                return Err(Error::InvalidSignature {
                    reason: format!("duplicate parameter name '{name}'"),
                });
            }
            match &param.kind {
                ParamKind::Positional { default } => {
                    if varargs.is_some() || keywords.is_some() {
                        return Err(Error::InvalidSignature {
                            reason: format!(
                                "positional parameter '{name}' after a collecting parameter"
                            ),
                        });
                    }
                    if default.is_some() {
                        seen_default = true;
                    } else if seen_default {
                        return Err(Error::InvalidSignature {
                            reason: format!(
                                "parameter '{name}' without a default follows a defaulted parameter"
                            ),
                        });
                    }
                    positionals.push(param);
                }
                ParamKind::Variadic => {
                    if varargs.is_some() {
                        return Err(Error::InvalidSignature {
                            reason: "more than one variadic parameter".to_string(),
                        });
                    }
                    if keywords.is_some() {
                        return Err(Error::InvalidSignature {
                            reason: format!(
                                "variadic parameter '{name}' after the keyword-bag parameter"
                            ),
                        });
                    }
                    varargs = Some(name);
                }
                ParamKind::KeywordBag => {
                    if keywords.is_some() {
                        return Err(Error::InvalidSignature {
                            reason: "more than one keyword-bag parameter".to_string(),
                        });
                    }
                    keywords = Some(name);
                }
            }
        }

        Ok(Self { positionals, varargs, keywords })
    }

    /// The declared positional parameters, in order.
    pub fn positionals(&self) -> &[Param] {
        &self.positionals
    }

    /// Name of the variadic parameter, if declared.
    pub fn varargs_name(&self) -> Option<&str> {
        self.varargs.as_deref()
    }

    /// Name of the keyword-bag parameter, if declared.
    pub fn keywords_name(&self) -> Option<&str> {
        self.keywords.as_deref()
    }

    /// Default threaded into a compiled input for the named parameter.
    ///
    /// The last defaulted positional slot loses its default when the
    /// signature also declares a variadic parameter; the variadic
    /// parameter itself never carries one.
    pub(crate) fn compiled_default(&self, name: &str) -> Option<Value> {
        let idx = self.positionals.iter().position(|p| p.name == name)?;
        let default = self.positionals[idx].default()?.clone();
        if self.varargs.is_some() && idx == self.positionals.len() - 1 {
            return None;
        }
        Some(default)
    }

    /// Replace small-integer defaults with boxed copies so interned
    /// identities never reach a trace through the defaults.
    pub(crate) fn boxed_defaults(mut self) -> Self {
        for param in &mut self.positionals {
            if let ParamKind::Positional { default: Some(d) } = &mut param.kind {
                if d.is_small_int() {
                    *d = d.boxed();
                }
            }
        }
        self
    }

    /// Bind a concrete call's arguments to the declared parameters.
    ///
    /// Returns an ordered map covering every declared parameter (supplied,
    /// keyword-supplied, or defaulted), the variadic tuple, and the
    /// keyword bag, in declaration order.
    pub fn bind(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<BoundArgs> {
        let mut remaining: IndexMap<String, Value> = IndexMap::new();
        for (name, value) in kwargs {
            if remaining.insert(name.to_string(), value.clone()).is_some() {
                return Err(Error::BindingFailure {
                    reason: format!("keyword argument '{name}' supplied more than once"),
                });
            }
        }

        let mut entries: IndexMap<String, BoundValue> = IndexMap::new();

        for (i, param) in self.positionals.iter().enumerate() {
            let value = if i < args.len() {
                if remaining.shift_remove(&param.name).is_some() {
                    return Err(Error::BindingFailure {
                        reason: format!(
                            "argument '{name}' supplied both positionally and by keyword",
                            name = param.name
                        ),
                    });
                }
                args[i].clone()
            } else if let Some(value) = remaining.shift_remove(&param.name) {
                value
            } else if let Some(default) = param.default() {
                default.clone()
            } else {
                return Err(Error::BindingFailure {
                    reason: format!("missing required argument '{name}'", name = param.name),
                });
            };
            entries.insert(param.name.clone(), BoundValue::One(value));
        }

        let extras: Vec<Value> = args.get(self.positionals.len()..).unwrap_or(&[]).to_vec();
        match (&self.varargs, extras.is_empty()) {
            (Some(name), _) => {
                entries.insert(name.clone(), BoundValue::Sequence(extras));
            }
            (None, false) => {
                return Err(Error::BindingFailure {
                    reason: format!(
                        "takes {} positional argument(s) but {} were given",
                        self.positionals.len(),
                        args.len()
                    ),
                });
            }
            (None, true) => {}
        }

        match (&self.keywords, remaining.is_empty()) {
            (Some(name), _) => {
                entries.insert(name.clone(), BoundValue::Bag(remaining));
            }
            (None, false) => {
                let unexpected = remaining.keys().next().cloned().unwrap_or_default();
                return Err(Error::BindingFailure {
                    reason: format!("unexpected keyword argument '{unexpected}'"),
                });
            }
            (None, true) => {}
        }

        Ok(BoundArgs {
            entries,
            varargs_name: self.varargs.clone(),
            keywords_name: self.keywords.clone(),
        })
    }
}

/// One bound entry: a single value, the variadic tuple, or the keyword bag.
#[derive(Debug, Clone)]
pub enum BoundValue {
    /// The value bound to an ordinary declared parameter.
    One(Value),
    /// The ordered tuple bound to the variadic parameter.
    Sequence(Vec<Value>),
    /// The ordered mapping bound to the keyword-bag parameter.
    Bag(IndexMap<String, Value>),
}

/// The resolved arguments of one call, in declaration order.
///
/// This is what a traced function body receives: values are looked up by
/// declared name, with the variadic tuple and keyword bag exposed under
/// their own accessors.
#[derive(Debug, Clone)]
pub struct BoundArgs {
    entries: IndexMap<String, BoundValue>,
    varargs_name: Option<String>,
    keywords_name: Option<String>,
}

impl BoundArgs {
    /// The value bound to a declared parameter.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a declared single-valued parameter. Function
    /// bodies address their own declared parameters, so a miss is a
    /// programming error in the body.
    pub fn arg(&self, name: &str) -> &Value {
        match self.entries.get(name) {
            Some(BoundValue::One(value)) => value,
            _ => panic!("no bound argument named '{name}'"),
        }
    }

    /// The value bound to a declared parameter, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name) {
            Some(BoundValue::One(value)) => Some(value),
            _ => None,
        }
    }

    /// The variadic tuple (empty when no variadic parameter is declared).
    pub fn varargs(&self) -> &[Value] {
        match self.varargs_name.as_ref().and_then(|n| self.entries.get(n)) {
            Some(BoundValue::Sequence(values)) => values,
            _ => &[],
        }
    }

    /// Number of variadic arguments supplied: the artifact-cache key.
    pub fn variadic_len(&self) -> usize {
        self.varargs().len()
    }

    /// A keyword-bag entry by name.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        match self.keywords_name.as_ref().and_then(|n| self.entries.get(n)) {
            Some(BoundValue::Bag(bag)) => bag.get(name),
            _ => None,
        }
    }

    /// The keyword bag, in the order the keywords were supplied.
    pub fn keywords(&self) -> impl Iterator<Item = (&str, &Value)> {
        let bag = match self.keywords_name.as_ref().and_then(|n| self.entries.get(n)) {
            Some(BoundValue::Bag(bag)) => Some(bag),
            _ => None,
        };
        bag.into_iter().flatten().map(|(k, v)| (k.as_str(), v))
    }

    /// All entries in declaration order.
    pub fn entries(&self) -> &IndexMap<String, BoundValue> {
        &self.entries
    }

    /// Positional values for artifact invocation: declared parameters in
    /// order, then the variadic elements in order.
    pub(crate) fn positional_values(&self) -> Vec<Value> {
        let mut values = Vec::new();
        for bound in self.entries.values() {
            match bound {
                BoundValue::One(value) => values.push(value.clone()),
                BoundValue::Sequence(elems) => values.extend(elems.iter().cloned()),
                BoundValue::Bag(_) => {}
            }
        }
        values
    }

    /// Keyword values for artifact invocation: the keyword bag.
    pub(crate) fn keyword_values(&self) -> Vec<(&str, Value)> {
        self.keywords().map(|(k, v)| (k, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_signature() -> Signature {
        Signature::new([
            Param::positional("x"),
            Param::with_default("y", Value::from(2.0)),
            Param::variadic("rest"),
            Param::keyword_bag("opts"),
        ])
        .unwrap()
    }

    #[test]
    fn test_bind_fills_defaults() {
        let sig = Signature::new([
            Param::positional("x"),
            Param::with_default("y", Value::from(2.0)),
        ])
        .unwrap();

        let bound = sig.bind(&[Value::from(1.0)], &[]).unwrap();
        assert_eq!(bound.arg("x"), &Value::from(1.0));
        assert_eq!(bound.arg("y"), &Value::from(2.0));
        assert!(bound.get("z").is_none());
    }

    #[test]
    fn test_bind_keyword_overrides_default() {
        let sig = Signature::new([
            Param::positional("x"),
            Param::with_default("y", Value::from(2.0)),
        ])
        .unwrap();

        let bound = sig
            .bind(&[Value::from(1.0)], &[("y", Value::from(5.0))])
            .unwrap();
        assert_eq!(bound.arg("y"), &Value::from(5.0));
    }

    #[test]
    fn test_bind_collects_varargs_and_keywords() {
        let sig = full_signature();
        let bound = sig
            .bind(
                &[
                    Value::from(1.0),
                    Value::from(2.0),
                    Value::from(3.0),
                    Value::from(4.0),
                ],
                &[("alpha", Value::from(0.5))],
            )
            .unwrap();

        assert_eq!(bound.varargs().len(), 2);
        assert_eq!(bound.variadic_len(), 2);
        assert_eq!(bound.keyword("alpha"), Some(&Value::from(0.5)));

        // Declaration order: x, y, rest, opts.
        let names: Vec<&String> = bound.entries().keys().collect();
        assert_eq!(names, ["x", "y", "rest", "opts"]);
    }

    #[test]
    fn test_bind_missing_required() {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        let err = sig.bind(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_bind_rejects_surplus_positionals() {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        let err = sig
            .bind(&[Value::from(1.0), Value::from(2.0)], &[])
            .unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_bind_rejects_unknown_keyword() {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        let err = sig
            .bind(&[Value::from(1.0)], &[("z", Value::from(2.0))])
            .unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_bind_rejects_double_binding() {
        let sig = Signature::new([Param::positional("x")]).unwrap();
        let err = sig
            .bind(&[Value::from(1.0)], &[("x", Value::from(2.0))])
            .unwrap_err();
        assert!(matches!(err, Error::BindingFailure { .. }));
    }

    #[test]
    fn test_signature_rejects_default_gap() {
        let err = Signature::new([
            Param::with_default("x", Value::from(1.0)),
            Param::positional("y"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { .. }));
    }

    #[test]
    fn test_param_kind_tags() {
        assert!(matches!(
            Param::variadic("rest").kind(),
            ParamKind::Variadic
        ));
        assert!(matches!(
            Param::keyword_bag("opts").kind(),
            ParamKind::KeywordBag
        ));
        assert_eq!(
            Param::with_default("y", Value::from(2.0)).default(),
            Some(&Value::from(2.0))
        );
    }

    #[test]
    fn test_signature_rejects_duplicate_names() {
        let err =
            Signature::new([Param::positional("x"), Param::positional("x")]).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { .. }));
    }

    #[test]
    fn test_compiled_default_withheld_under_varargs() {
        let sig = full_signature();
        assert_eq!(sig.compiled_default("y"), None);

        let plain = Signature::new([
            Param::positional("x"),
            Param::with_default("y", Value::from(2.0)),
        ])
        .unwrap();
        assert_eq!(plain.compiled_default("y"), Some(Value::from(2.0)));
    }

    #[test]
    fn test_boxed_defaults_break_interning() {
        let sig = Signature::new([Param::with_default("n", Value::from(3i64))])
            .unwrap()
            .boxed_defaults();
        let bound = sig.bind(&[], &[]).unwrap();
        assert_ne!(bound.arg("n").id(), Value::from(3i64).id());
        assert_eq!(bound.arg("n"), &Value::from(3i64));
    }

    #[test]
    fn test_positional_values_order() {
        let sig = full_signature();
        let bound = sig
            .bind(
                &[Value::from(1.0), Value::from(2.0), Value::from(3.0)],
                &[("beta", Value::from(9.0))],
            )
            .unwrap();
        let positional = bound.positional_values();
        assert_eq!(
            positional,
            vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]
        );
        let keywords = bound.keyword_values();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].0, "beta");
    }
}
