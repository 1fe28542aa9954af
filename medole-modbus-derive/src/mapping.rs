use crate::config::Config;
use crate::entry::{Address, Entry};
use proc_macro2::{Ident, TokenStream};
use syn::{Data, DeriveInput, Fields, Type};

#[derive(Debug, Clone)]
pub struct Mapping(pub Vec<Entry>);

impl Mapping {
    pub fn new(ast: &DeriveInput) -> Self {
        let data_struct = match ast.data.clone() {
            Data::Struct(data_struct) => data_struct,
            _ => panic!("Trait can be implemented only for a struct."),
        };

        let named_fields = match data_struct.fields {
            Fields::Named(fields_named) => fields_named.named,
            _ => panic!("Trait can be implemented only for a struct with named fields."),
        };
        let mut map: Vec<Entry> = named_fields
            .into_iter()
            .filter(|field| {
                field
                    .attrs
                    .iter()
                    .any(|attr| attr.path().is_ident("modbus"))
            })
            .map(From::from)
            .collect::<Vec<_>>();

        map.sort_by_key(|x| x.addr);
        if let Some(pair) = map.windows(2).find(|pair| pair[0].addr == pair[1].addr) {
            panic!(
                "Fields `{}` and `{}` are both mapped to address {:#06x}.",
                pair[0].field_name, pair[1].field_name, pair[0].addr
            );
        }

        Self(map)
    }

    pub fn writable(&self) -> Self {
        Self(self.0.iter().filter(|e| e.is_writable()).cloned().collect())
    }

    pub fn field_name_vec(&self) -> Vec<Ident> {
        self.0.iter().map(|x| x.field_name_ident()).collect()
    }

    pub fn field_name_str_vec(&self) -> Vec<String> {
        self.0.iter().map(|x| x.field_name.clone()).collect()
    }

    pub fn field_ty_vec(&self) -> Vec<Type> {
        self.0.iter().map(|x| x.field_ty.clone()).collect()
    }

    pub fn addr_vec(&self) -> Vec<Address> {
        self.0.iter().map(|x| x.addr).collect()
    }

    pub fn access_vec(&self) -> Vec<TokenStream> {
        self.0.iter().map(|x| x.access_tokens()).collect()
    }

    pub fn write_method_vec(&self) -> Vec<Ident> {
        self.0.iter().map(|x| x.write_method_ident()).collect()
    }

    pub fn register_range(&self) -> (Address, Address) {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => (first.addr, last.end()),
            _ => (0, 0),
        }
    }
}

impl Mapping {
    /// Group entries into blocks that can each be read with one request.
    pub fn split_into_block_mappings(self, config: &Config) -> Vec<Self> {
        let mut block_mappings = vec![];
        let mut entries: Vec<Entry> = Vec::with_capacity(self.0.len());

        for entry in self.0 {
            let fits = match (entries.first(), entries.last()) {
                (Some(first), Some(last)) => {
                    let max_cond = entry.end() - first.addr <= config.max_cnt_per_request;
                    let gap_cond = last.end() == entry.addr;
                    max_cond && (gap_cond || config.allow_register_gaps)
                }
                _ => true,
            };
            if !fits {
                block_mappings.push(Mapping(std::mem::take(&mut entries)));
            }
            entries.push(entry);
        }

        if !entries.is_empty() {
            block_mappings.push(Mapping(entries));
        }

        block_mappings
    }
}
