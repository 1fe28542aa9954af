use crate::utils::{check_keys, find_int, find_str, get_punctuated, panic_no_key};
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use syn::{Field, Type};

pub type Address = u16;
pub type Quantity = u16;

/// Registers occupied by one field; every register value is a single word.
pub const WORDS_PER_ENTRY: Quantity = 1;

#[derive(Debug, Clone)]
/// Single entry in the register mapping, parsed from a field attribute.
pub struct Entry {
    pub field_name: String,
    pub field_ty: Type,
    pub addr: Address,
    pub access: Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl From<String> for Access {
    fn from(value: String) -> Self {
        match value.as_str() {
            "r" => Access::ReadOnly,
            "rw" => Access::ReadWrite,
            s => panic!(
                "Invalid `access` variant \"{s}\". Use \"r\" for read-only or \"rw\" for read-write."
            ),
        }
    }
}

impl From<Field> for Entry {
    fn from(value: Field) -> Self {
        let field_name = value
            .ident
            .unwrap_or_else(|| panic!("Unexpected unnamed struct field."))
            .to_string();

        let attr = value
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("modbus"))
            .unwrap_or_else(|| {
                panic!("Unexpected missing attribute `modbus` for `{field_name}` field.")
            });
        let punctuated = get_punctuated(attr, &field_name);
        check_keys(&punctuated, &["addr", "access"], &field_name);

        let addr = find_int(&punctuated, "addr", &field_name)
            .unwrap_or_else(|| panic_no_key("addr", &field_name))
            .base10_parse::<Address>()
            .unwrap_or_else(|_| panic!("In `modbus` attribute for `{field_name}`, the key `addr` could not be parsed to u16."));
        let access = find_str(&punctuated, "access", &field_name)
            .unwrap_or_else(|| panic_no_key("access", &field_name))
            .value()
            .into();

        Self {
            field_name,
            field_ty: value.ty,
            addr,
            access,
        }
    }
}

impl Entry {
    pub fn end(&self) -> Address {
        self.addr + WORDS_PER_ENTRY
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    pub fn field_name_ident(&self) -> Ident {
        Ident::new(&self.field_name, Span::call_site())
    }

    pub fn write_method_ident(&self) -> Ident {
        Ident::new(&format!("write_{}", self.field_name), Span::call_site())
    }

    /// Path of the matching `medole_modbus::catalog::Access` variant.
    pub fn access_tokens(&self) -> TokenStream {
        match self.access {
            Access::ReadOnly => quote!(medole_modbus::catalog::Access::ReadOnly),
            Access::ReadWrite => quote!(medole_modbus::catalog::Access::ReadWrite),
        }
    }
}
