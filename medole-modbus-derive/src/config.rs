use crate::entry::Quantity;
use crate::utils::{check_keys, find_bool, find_int, get_punctuated};
use syn::DeriveInput;

/// Most registers a single read holding registers request may return.
const MAX_CNT_PER_REQUEST: Quantity = 123;

#[derive(Debug)]
pub struct Config {
    pub max_cnt_per_request: Quantity,
    pub allow_register_gaps: bool,
}

impl Config {
    pub fn new(ast: &DeriveInput) -> Self {
        let name = ast.ident.to_string();

        let mut config = Self {
            max_cnt_per_request: MAX_CNT_PER_REQUEST,
            allow_register_gaps: false,
        };
        let Some(attr) = ast.attrs.iter().find(|attr| attr.path().is_ident("modbus")) else {
            return config;
        };

        let punctuated = get_punctuated(attr, &name);
        check_keys(&punctuated, &["max_cnt_per_request", "allow_gaps"], &name);

        if let Some(lit_int) = find_int(&punctuated, "max_cnt_per_request", &name) {
            let cnt = lit_int.base10_parse::<Quantity>().unwrap_or_else(|_| {
                panic!("In `modbus` attribute for `{name}`, the key `max_cnt_per_request` could not be parsed to u16.")
            });
            if cnt == 0 || cnt > MAX_CNT_PER_REQUEST {
                panic!("In `modbus` attribute for `{name}`, `max_cnt_per_request` must be within 1..={MAX_CNT_PER_REQUEST}.");
            }
            config.max_cnt_per_request = cnt;
        }
        if let Some(lit_bool) = find_bool(&punctuated, "allow_gaps", &name) {
            config.allow_register_gaps = lit_bool.value();
        }

        config
    }
}
