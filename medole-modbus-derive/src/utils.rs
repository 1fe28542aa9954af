use syn::{
    punctuated::Punctuated, token::Comma, Attribute, Expr, ExprAssign, Lit, LitBool, LitInt,
    LitStr, Meta,
};

pub type Assignments = Punctuated<ExprAssign, Comma>;

pub fn get_punctuated(attr: &Attribute, name: &str) -> Assignments {
    match &attr.meta {
        Meta::List(meta_list) => meta_list
            .clone()
            .parse_args_with(Assignments::parse_terminated)
            .unwrap_or_else(|_| panic!("`modbus` attribute for `{name}` is not a comma separated sequence of assignment expressions.")),
        _ => panic!("The `modbus` attribute for `{name}` is not a list, use `#[modbus(key = value, ...)]`."),
    }
}

/// Right-hand side literal of the `key = literal` assignment, if present.
fn find_lit(assignments: &Assignments, key: &str, name: &str) -> Option<Lit> {
    assignments
        .iter()
        .find(|expr_assign| match &*expr_assign.left {
            Expr::Path(left) => left.path.is_ident(key),
            not_expr_path => panic!(
                "In the `modbus` attribute for `{name}`, the key `{not_expr_path:?}` is not a path expression."
            ),
        })
        .map(|expr_assign| match &*expr_assign.right {
            Expr::Lit(right) => right.lit.clone(),
            _ => panic_not_literal(key, "", name),
        })
}

pub fn find_int(assignments: &Assignments, key: &str, name: &str) -> Option<LitInt> {
    find_lit(assignments, key, name).map(|lit| match lit {
        Lit::Int(lit_int) => lit_int,
        _ => panic_not_literal(key, "integer", name),
    })
}

pub fn find_str(assignments: &Assignments, key: &str, name: &str) -> Option<LitStr> {
    find_lit(assignments, key, name).map(|lit| match lit {
        Lit::Str(lit_str) => lit_str,
        _ => panic_not_literal(key, "string", name),
    })
}

pub fn find_bool(assignments: &Assignments, key: &str, name: &str) -> Option<LitBool> {
    find_lit(assignments, key, name).map(|lit| match lit {
        Lit::Bool(lit_bool) => lit_bool,
        _ => panic_not_literal(key, "bool", name),
    })
}

/// Panic unless every key of the attribute is one of `known`.
pub fn check_keys(assignments: &Assignments, known: &[&str], name: &str) {
    for expr_assign in assignments {
        let key = match &*expr_assign.left {
            Expr::Path(left) => left.path.get_ident().map(ToString::to_string),
            _ => None,
        };
        match key {
            Some(key) if known.contains(&key.as_str()) => {}
            Some(key) => panic!(
                "In `modbus` attribute for `{name}`, unknown key `{key}`. Expected one of {known:?}."
            ),
            None => panic!("In `modbus` attribute for `{name}`, keys must be plain identifiers."),
        }
    }
}

pub fn panic_not_literal(key: &str, lit_ty: &str, name: &str) -> ! {
    panic!(
        "In `modbus` attribute for `{}`, the key `{}` is not set to a {} literal.",
        name, key, lit_ty
    )
}

pub fn panic_no_key(key: &str, name: &str) -> ! {
    panic!("In `modbus` attribute for `{}`, no key `{}`", name, key)
}
