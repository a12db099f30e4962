//! Structural comparability for types
//!
//! All operations are pure and cycle-tolerant: recursive types unfold on
//! demand while a memo set of already-seen node pairs guarantees
//! termination on mutually recursive inputs. `union`/`intersect`/
//! `equal_refine` raise a [`TypeError`] carrying the full nested path on
//! structural mismatch.
//!
//! Variance: `Function` inputs are contravariant and the output covariant;
//! platform sets are unioned by `union` and intersected by `intersect`.
//! `Struct` combination is positional. `Never` is a subtype of everything,
//! the identity of `union`, and the absorbing element of `intersect`.

use crate::error::TypeError;
use crate::types::Type;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

/// Structural, cycle-tolerant type equality.
pub fn type_equal(a: &Type, b: &Type) -> bool {
    let mut ctx = CmpCtx::new(false);
    ctx.compare(a, b, CmpMode::Equal)
}

/// Structural, cycle-tolerant subtyping. `Never` is a subtype of every type.
pub fn subtype(a: &Type, b: &Type) -> bool {
    let mut ctx = CmpCtx::new(false);
    ctx.compare(a, b, CmpMode::Subtype)
}

/// Subtyping that ignores function platform sets. Used when checking
/// builtin arguments, whose signatures do not constrain platforms.
pub fn subtype_relaxed(a: &Type, b: &Type) -> bool {
    let mut ctx = CmpCtx::new(true);
    ctx.compare(a, b, CmpMode::Subtype)
}

/// Least common supertype of `a` and `b`.
pub fn union(a: &Type, b: &Type) -> Result<Type, TypeError> {
    combine(a, b, Combine::Union)
}

/// Greatest common subtype of `a` and `b`.
pub fn intersect(a: &Type, b: &Type) -> Result<Type, TypeError> {
    combine(a, b, Combine::Intersect)
}

/// Assert that `a` and `b` are the same type shape, producing the refined
/// combination. Unlike `union`, variant case sets must match exactly.
pub fn equal_refine(a: &Type, b: &Type) -> Result<Type, TypeError> {
    combine(a, b, Combine::EqualRefine)
}

#[derive(Clone, Copy, PartialEq)]
enum CmpMode {
    Equal,
    Subtype,
}

struct CmpCtx {
    env_a: Vec<Rc<Type>>,
    env_b: Vec<Rc<Type>>,
    seen: HashSet<(usize, usize)>,
    ignore_platforms: bool,
}

impl CmpCtx {
    fn new(ignore_platforms: bool) -> Self {
        CmpCtx {
            env_a: Vec::new(),
            env_b: Vec::new(),
            seen: HashSet::new(),
            ignore_platforms,
        }
    }

    /// Identity key of a node for the memo set: recursive bodies key by
    /// their shared `Rc` address, everything else by tree address.
    fn key(ty: &Type, env: &[Rc<Type>]) -> usize {
        match ty {
            Type::Recursive(inner) => Rc::as_ptr(inner) as usize,
            Type::RecursiveRef(d) => {
                let idx = env.len() - *d as usize;
                Rc::as_ptr(&env[idx]) as usize
            }
            other => other as *const Type as usize,
        }
    }

    fn compare(&mut self, a: &Type, b: &Type, mode: CmpMode) -> bool {
        // Never first, so it wins even against recursive right-hand sides.
        if mode == CmpMode::Subtype && matches!(a, Type::Never) {
            return true;
        }
        match (a, b) {
            (Type::Recursive(ra), _) => {
                let pair = (Rc::as_ptr(ra) as usize, Self::key(b, &self.env_b));
                if !self.seen.insert(pair) {
                    return true;
                }
                self.env_a.push(ra.clone());
                let result = self.compare(ra, b, mode);
                self.env_a.pop();
                result
            }
            (_, Type::Recursive(rb)) => {
                let pair = (Self::key(a, &self.env_a), Rc::as_ptr(rb) as usize);
                if !self.seen.insert(pair) {
                    return true;
                }
                self.env_b.push(rb.clone());
                let result = self.compare(a, rb, mode);
                self.env_b.pop();
                result
            }
            (Type::RecursiveRef(d), _) => {
                let idx = self.env_a.len() - *d as usize;
                let ra = self.env_a[idx].clone();
                let saved: Vec<Rc<Type>> = self.env_a.drain(idx + 1..).collect();
                let pair = (Rc::as_ptr(&ra) as usize, Self::key(b, &self.env_b));
                let result = if !self.seen.insert(pair) {
                    true
                } else {
                    self.compare(&ra, b, mode)
                };
                self.env_a.extend(saved);
                result
            }
            (_, Type::RecursiveRef(d)) => {
                let idx = self.env_b.len() - *d as usize;
                let rb = self.env_b[idx].clone();
                let saved: Vec<Rc<Type>> = self.env_b.drain(idx + 1..).collect();
                let pair = (Self::key(a, &self.env_a), Rc::as_ptr(&rb) as usize);
                let result = if !self.seen.insert(pair) {
                    true
                } else {
                    self.compare(a, &rb, mode)
                };
                self.env_b.extend(saved);
                result
            }
            (Type::Never, Type::Never)
            | (Type::Null, Type::Null)
            | (Type::Boolean, Type::Boolean)
            | (Type::Integer, Type::Integer)
            | (Type::Float, Type::Float)
            | (Type::String, Type::String)
            | (Type::DateTime, Type::DateTime)
            | (Type::Blob, Type::Blob) => true,
            (Type::Array(ea), Type::Array(eb))
            | (Type::Set(ea), Type::Set(eb))
            | (Type::Ref(ea), Type::Ref(eb)) => self.compare(ea, eb, mode),
            (Type::Dict(ka, va), Type::Dict(kb, vb)) => {
                self.compare(ka, kb, mode) && self.compare(va, vb, mode)
            }
            (Type::Struct(fa), Type::Struct(fb)) => {
                fa.len() == fb.len()
                    && fa.iter().zip(fb.iter()).all(|((na, ta), (nb, tb))| {
                        na == nb && self.compare(ta, tb, mode)
                    })
            }
            (Type::Variant(ca), Type::Variant(cb)) => match mode {
                CmpMode::Equal => {
                    ca.len() == cb.len()
                        && ca.iter().zip(cb.iter()).all(|((na, ta), (nb, tb))| {
                            na == nb && self.compare(ta, tb, mode)
                        })
                }
                // Every case of the subtype must be present in the
                // supertype with a covariant case type.
                CmpMode::Subtype => ca.iter().all(|(na, ta)| {
                    cb.iter()
                        .any(|(nb, tb)| na == nb && self.compare(ta, tb, mode))
                }),
            },
            (
                Type::Function {
                    inputs: ia,
                    output: oa,
                    platforms: pa,
                },
                Type::Function {
                    inputs: ib,
                    output: ob,
                    platforms: pb,
                },
            )
            | (
                Type::AsyncFunction {
                    inputs: ia,
                    output: oa,
                    platforms: pa,
                },
                Type::AsyncFunction {
                    inputs: ib,
                    output: ob,
                    platforms: pb,
                },
            ) => {
                if ia.len() != ib.len() {
                    return false;
                }
                let platforms_ok = self.ignore_platforms
                    || match mode {
                        CmpMode::Equal => pa == pb,
                        CmpMode::Subtype => pa.is_subset(pb),
                    };
                let inputs_ok = match mode {
                    CmpMode::Equal => {
                        // Swap sides for contravariance symmetry; for
                        // equality both directions coincide.
                        ia.iter()
                            .zip(ib.iter())
                            .all(|(ta, tb)| self.compare(ta, tb, mode))
                    }
                    CmpMode::Subtype => ia
                        .iter()
                        .zip(ib.iter())
                        .all(|(ta, tb)| self.flipped(ta, tb)),
                };
                platforms_ok && inputs_ok && self.compare(oa, ob, mode)
            }
            _ => false,
        }
    }

    /// Contravariant input check: `subtype(tb, ta)` with sides swapped.
    fn flipped(&mut self, ta: &Type, tb: &Type) -> bool {
        std::mem::swap(&mut self.env_a, &mut self.env_b);
        let result = self.compare(tb, ta, CmpMode::Subtype);
        std::mem::swap(&mut self.env_a, &mut self.env_b);
        result
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Combine {
    Union,
    Intersect,
    EqualRefine,
}

impl Combine {
    /// Flip for contravariant positions.
    fn flip(self) -> Combine {
        match self {
            Combine::Union => Combine::Intersect,
            Combine::Intersect => Combine::Union,
            Combine::EqualRefine => Combine::EqualRefine,
        }
    }
}

fn mismatch(a: &Type, b: &Type) -> TypeError {
    TypeError::new(format!("types {a} and {b} are not compatible"))
}

fn combine(a: &Type, b: &Type, mode: Combine) -> Result<Type, TypeError> {
    match (a, b) {
        // Never is the identity of union and the absorbing element of
        // intersect.
        (Type::Never, other) | (other, Type::Never) if mode == Combine::Union => {
            Ok(other.clone())
        }
        (Type::Never, _) | (_, Type::Never) if mode == Combine::Intersect => Ok(Type::Never),
        (Type::Never, Type::Never) => Ok(Type::Never),
        // Distinct recursive types only combine when they are already
        // structurally equal; unfolding both sides has no finite closed
        // representation in general.
        (Type::Recursive(_), _)
        | (_, Type::Recursive(_))
        | (Type::RecursiveRef(_), _)
        | (_, Type::RecursiveRef(_)) => {
            if type_equal(a, b) {
                Ok(a.clone())
            } else {
                Err(TypeError::new(format!(
                    "recursive types {a} and {b} are not structurally equal"
                )))
            }
        }
        (Type::Null, Type::Null) => Ok(Type::Null),
        (Type::Boolean, Type::Boolean) => Ok(Type::Boolean),
        (Type::Integer, Type::Integer) => Ok(Type::Integer),
        (Type::Float, Type::Float) => Ok(Type::Float),
        (Type::String, Type::String) => Ok(Type::String),
        (Type::DateTime, Type::DateTime) => Ok(Type::DateTime),
        (Type::Blob, Type::Blob) => Ok(Type::Blob),
        (Type::Array(ea), Type::Array(eb)) => Ok(Type::Array(Box::new(
            combine(ea, eb, mode).map_err(|e| e.push("array element"))?,
        ))),
        (Type::Set(ka), Type::Set(kb)) => Ok(Type::Set(Box::new(
            combine(ka, kb, mode).map_err(|e| e.push("set key"))?,
        ))),
        (Type::Dict(ka, va), Type::Dict(kb, vb)) => Ok(Type::Dict(
            Box::new(combine(ka, kb, mode).map_err(|e| e.push("dict key"))?),
            Box::new(combine(va, vb, mode).map_err(|e| e.push("dict value"))?),
        )),
        (Type::Ref(ia), Type::Ref(ib)) => Ok(Type::Ref(Box::new(
            combine(ia, ib, mode).map_err(|e| e.push("ref"))?,
        ))),
        (Type::Struct(fa), Type::Struct(fb)) => {
            if fa.len() != fb.len() {
                return Err(TypeError::new(format!(
                    "structs have {} and {} fields",
                    fa.len(),
                    fb.len()
                )));
            }
            let mut fields = Vec::with_capacity(fa.len());
            for (i, ((na, ta), (nb, tb))) in fa.iter().zip(fb.iter()).enumerate() {
                if na != nb {
                    return Err(TypeError::new(format!(
                        "struct field {i} is named {na} in one type and {nb} in the other"
                    )));
                }
                let field = combine(ta, tb, mode)
                    .map_err(|e| e.push(format!("struct field {na}")))?;
                fields.push((na.clone(), field));
            }
            Ok(Type::Struct(fields))
        }
        (Type::Variant(ca), Type::Variant(cb)) => combine_variants(ca, cb, mode),
        (
            Type::Function {
                inputs: ia,
                output: oa,
                platforms: pa,
            },
            Type::Function {
                inputs: ib,
                output: ob,
                platforms: pb,
            },
        ) => {
            let (inputs, output, platforms) =
                combine_function(ia, oa, pa, ib, ob, pb, mode)?;
            Ok(Type::Function {
                inputs,
                output: Box::new(output),
                platforms,
            })
        }
        (
            Type::AsyncFunction {
                inputs: ia,
                output: oa,
                platforms: pa,
            },
            Type::AsyncFunction {
                inputs: ib,
                output: ob,
                platforms: pb,
            },
        ) => {
            let (inputs, output, platforms) =
                combine_function(ia, oa, pa, ib, ob, pb, mode)?;
            Ok(Type::AsyncFunction {
                inputs,
                output: Box::new(output),
                platforms,
            })
        }
        _ => Err(mismatch(a, b)),
    }
}

fn combine_variants(
    ca: &[(String, Type)],
    cb: &[(String, Type)],
    mode: Combine,
) -> Result<Type, TypeError> {
    let mut cases: Vec<(String, Type)> = Vec::new();
    match mode {
        // Union of the case sets; case types are unioned where present in
        // both.
        Combine::Union => {
            for (name, ta) in ca {
                let case = match cb.iter().find(|(n, _)| n == name) {
                    Some((_, tb)) => combine(ta, tb, mode)
                        .map_err(|e| e.push(format!("variant case {name}")))?,
                    None => ta.clone(),
                };
                cases.push((name.clone(), case));
            }
            for (name, tb) in cb {
                if !ca.iter().any(|(n, _)| n == name) {
                    cases.push((name.clone(), tb.clone()));
                }
            }
        }
        // Intersection keeps only the shared case names.
        Combine::Intersect => {
            for (name, ta) in ca {
                if let Some((_, tb)) = cb.iter().find(|(n, _)| n == name) {
                    let case = combine(ta, tb, mode)
                        .map_err(|e| e.push(format!("variant case {name}")))?;
                    cases.push((name.clone(), case));
                }
            }
        }
        Combine::EqualRefine => {
            for (name, ta) in ca {
                let Some((_, tb)) = cb.iter().find(|(n, _)| n == name) else {
                    return Err(TypeError::new(format!(
                        "variant case {name} is not present in both variants"
                    )));
                };
                let case = combine(ta, tb, mode)
                    .map_err(|e| e.push(format!("variant case {name}")))?;
                cases.push((name.clone(), case));
            }
            for (name, _) in cb {
                if !ca.iter().any(|(n, _)| n == name) {
                    return Err(TypeError::new(format!(
                        "variant case {name} is not present in both variants"
                    )));
                }
            }
        }
    }
    cases.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(Type::Variant(cases))
}

#[allow(clippy::type_complexity)]
fn combine_function(
    ia: &[Type],
    oa: &Type,
    pa: &BTreeSet<String>,
    ib: &[Type],
    ob: &Type,
    pb: &BTreeSet<String>,
    mode: Combine,
) -> Result<(Vec<Type>, Type, BTreeSet<String>), TypeError> {
    if ia.len() != ib.len() {
        return Err(TypeError::new(format!(
            "functions take {} and {} inputs",
            ia.len(),
            ib.len()
        )));
    }
    let mut inputs = Vec::with_capacity(ia.len());
    for (i, (ta, tb)) in ia.iter().zip(ib.iter()).enumerate() {
        // Inputs are contravariant.
        let input = combine(ta, tb, mode.flip())
            .map_err(|e| e.push(format!("function input {i}")))?;
        inputs.push(input);
    }
    let output = combine(oa, ob, mode).map_err(|e| e.push("function output"))?;
    let platforms = match mode {
        Combine::Union => pa.union(pb).cloned().collect(),
        Combine::Intersect => pa.intersection(pb).cloned().collect(),
        Combine::EqualRefine => {
            if pa != pb {
                return Err(TypeError::new(
                    "function platform sets are not equal".to_string(),
                ));
            }
            pa.clone()
        }
    };
    Ok((inputs, output, platforms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(inner: Type) -> Type {
        Type::recursive(Type::Variant(vec![
            ("cons".to_string(), Type::Struct(vec![
                ("head".to_string(), inner),
                ("tail".to_string(), Type::RecursiveRef(1)),
            ])),
            ("nil".to_string(), Type::Null),
        ]))
        .unwrap()
    }

    #[test]
    fn test_never_laws() {
        assert!(subtype(&Type::Never, &Type::String));
        assert!(subtype(&Type::Never, &list_of(Type::Integer)));
        assert_eq!(union(&Type::Never, &Type::Integer).unwrap(), Type::Integer);
        assert_eq!(intersect(&Type::Never, &Type::Integer).unwrap(), Type::Never);
    }

    #[test]
    fn test_recursive_equality_terminates() {
        let a = list_of(Type::Integer);
        let b = list_of(Type::Integer);
        assert!(type_equal(&a, &b));
        assert!(!type_equal(&a, &list_of(Type::Float)));
        assert!(type_equal(&a, &a.unfold().unwrap()));
    }

    #[test]
    fn test_variant_union_and_subtype() {
        let small = Type::Variant(vec![("a".to_string(), Type::Integer)]);
        let big = Type::Variant(vec![
            ("a".to_string(), Type::Integer),
            ("b".to_string(), Type::Null),
        ]);
        assert!(subtype(&small, &big));
        assert!(!subtype(&big, &small));
        assert_eq!(union(&small, &big).unwrap(), big);
        assert_eq!(intersect(&small, &big).unwrap(), small);
        let err = equal_refine(&small, &big).unwrap_err();
        assert!(err.to_string().contains("variant case b is not present"));
    }

    #[test]
    fn test_struct_positional() {
        let a = Type::Struct(vec![
            ("x".to_string(), Type::Integer),
            ("y".to_string(), Type::Float),
        ]);
        let b = Type::Struct(vec![
            ("y".to_string(), Type::Float),
            ("x".to_string(), Type::Integer),
        ]);
        assert!(union(&a, &b).is_err());
        assert!(union(&a, &a).is_ok());
        assert!(intersect(&a, &a).is_ok());
        assert!(equal_refine(&a, &a).is_ok());
    }

    #[test]
    fn test_function_variance() {
        let animal = Type::Variant(vec![
            ("cat".to_string(), Type::Null),
            ("dog".to_string(), Type::Null),
        ]);
        let cat = Type::Variant(vec![("cat".to_string(), Type::Null)]);
        let f_animal_cat = Type::function(vec![animal.clone()], cat.clone(), BTreeSet::new());
        let f_cat_animal = Type::function(vec![cat.clone()], animal.clone(), BTreeSet::new());
        // Wider input, narrower output is the subtype.
        assert!(subtype(&f_animal_cat, &f_cat_animal));
        assert!(!subtype(&f_cat_animal, &f_animal_cat));
    }

    #[test]
    fn test_function_platform_sets() {
        let p1: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let p2: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let f1 = Type::function(vec![], Type::Null, p1.clone());
        let f2 = Type::function(vec![], Type::Null, p2.clone());
        assert!(subtype(&f1, &f2));
        assert!(!subtype(&f2, &f1));
        match union(&f1, &f2).unwrap() {
            Type::Function { platforms, .. } => assert_eq!(platforms, p2),
            _ => panic!("expected function"),
        }
        match intersect(&f1, &f2).unwrap() {
            Type::Function { platforms, .. } => assert_eq!(platforms, p1),
            _ => panic!("expected function"),
        }
        assert!(subtype_relaxed(&f2, &f1));
    }

    #[test]
    fn test_mismatch_path() {
        let a = Type::Array(Box::new(Type::Dict(
            Box::new(Type::String),
            Box::new(Type::Integer),
        )));
        let b = Type::Array(Box::new(Type::Dict(
            Box::new(Type::String),
            Box::new(Type::Float),
        )));
        let err = union(&a, &b).unwrap_err();
        assert_eq!(
            err.to_string(),
            "array element: dict value: types Integer and Float are not compatible"
        );
    }
}
