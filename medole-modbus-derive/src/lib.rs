//! Macros to `derive` the `medole-modbus` register map traits

use proc_macro::TokenStream;
use quote::quote;

mod config;
mod entry;
mod mapping;
mod utils;

/// Derive macro to implement `medole_modbus::core::HoldingRegisterMap`
#[proc_macro_derive(HoldingRegisterMap, attributes(modbus))]
pub fn derive_holding_register_map(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    let name = &ast.ident;

    let block_config = config::Config::new(&ast);

    let mapping = mapping::Mapping::new(&ast);
    let all_field_name = mapping.field_name_vec();
    let block_mappings = mapping.clone().split_into_block_mappings(&block_config);

    let mut read_blocks = Vec::new();
    for mapping in block_mappings {
        let field_name = mapping.field_name_vec();
        let field_ty = mapping.field_ty_vec();
        let addr = mapping.addr_vec();

        let (start, end) = mapping.register_range();
        let len = end - start;

        let block = quote! {
            // Read
            let words = client.read_registers(#start, #len).await?;
            #(
                let offset = (#addr - #start) as usize;
                let word = words.get(offset..offset + 1).ok_or(medole_modbus::Error::RegisterCount {
                    address: #start,
                    expected: #len as usize,
                    actual: words.len(),
                })?;
                // Decode
                let #field_name = <#field_ty as medole_modbus::codec::RegisterValue>::from_words(word)?;
            )*
        };
        read_blocks.push(block);
    }

    let writable = mapping.writable();
    let field_name = writable.field_name_vec();
    let field_ty = writable.field_ty_vec();
    let addr = writable.addr_vec();
    let method = writable.write_method_vec();

    let tokens = quote! {
        #[async_trait::async_trait]
        impl medole_modbus::core::HoldingRegisterMap for #name {
            async fn update_from_holding_registers(
                &mut self,
                client: &dyn medole_modbus::core::RegisterReader,
            ) -> Result<(), medole_modbus::Error> {
                #(#read_blocks)*
                // Set only once every block decoded
                #(self.#all_field_name = #all_field_name;)*
                Ok(())
            }

            async fn write_to_registers(
                &self,
                client: &dyn medole_modbus::core::RegisterWriter,
            ) -> Result<(), medole_modbus::Error> {
                #(self.#method(client).await?;)*
                Ok(())
            }
        }

        impl #name {
            #(
                pub async fn #method(
                    &self,
                    client: &dyn medole_modbus::core::RegisterWriter,
                ) -> Result<(), medole_modbus::Error> {
                    let word = <#field_ty as medole_modbus::codec::RegisterValue>::to_word(&self.#field_name)?;
                    client.write_register(#addr, word).await
                }
            )*
        }
    };

    tokens.into()
}

/// Derive macro to implement `medole_modbus::simulator::HoldingRegisterModel`
#[proc_macro_derive(HoldingRegisterModel, attributes(modbus))]
pub fn derive_holding_register_model(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    let name = &ast.ident;

    let mapping = mapping::Mapping::new(&ast);

    let field_name = mapping.field_name_vec();
    let field_ty = mapping.field_ty_vec();
    let addr = mapping.addr_vec();
    let access = mapping.access_vec();

    let tokens = quote! {
        impl medole_modbus::simulator::HoldingRegisterModel for #name {
            fn new_registers(&self) -> Result<medole_modbus::simulator::Registers, medole_modbus::codec::CodecError> {
                let mut registers = medole_modbus::simulator::Registers::default();
                #(
                    let word = <#field_ty as medole_modbus::codec::RegisterValue>::to_word(&self.#field_name)?;
                    registers.insert(#addr, #access, word);
                )*
                Ok(registers)
            }

            fn update_registers(
                &self,
                registers: &mut medole_modbus::simulator::Registers,
            ) -> Result<(), medole_modbus::codec::CodecError> {
                #(
                    let word = <#field_ty as medole_modbus::codec::RegisterValue>::to_word(&self.#field_name)?;
                    registers.store(#addr, word);
                )*
                Ok(())
            }

            fn update_self(
                &mut self,
                registers: &medole_modbus::simulator::Registers,
            ) -> Result<(), medole_modbus::codec::CodecError> {
                #(
                    // Decode
                    let word = registers.get(#addr).ok_or(medole_modbus::codec::CodecError::WordsCount {
                        expected: 1,
                        actual: 0,
                    })?;
                    let #field_name = <#field_ty as medole_modbus::codec::RegisterValue>::from_word(word)?;
                )*
                // Set
                #(self.#field_name = #field_name;)*
                Ok(())
            }
        }
    };

    tokens.into()
}

/// Derive macro to implement `medole_modbus::core::RegisterLayout`
#[proc_macro_derive(RegisterLayout, attributes(modbus))]
pub fn derive_register_layout(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    let name = &ast.ident;

    let mapping = mapping::Mapping::new(&ast);

    let field_name = mapping.field_name_str_vec();
    let field_ty = mapping.field_ty_vec();
    let addr = mapping.addr_vec();
    let access = mapping.access_vec();

    let tokens = quote! {
        impl medole_modbus::core::RegisterLayout for #name {
            fn layout() -> Vec<medole_modbus::catalog::Register> {
                vec![
                    #(
                        medole_modbus::catalog::Register::new(
                            #field_name,
                            #addr,
                            #access,
                            <#field_ty as medole_modbus::codec::RegisterValue>::ENCODING,
                        ),
                    )*
                ]
            }
        }
    };

    tokens.into()
}
