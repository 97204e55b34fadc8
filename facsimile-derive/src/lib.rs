use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod record;

use record::RecordField;

/// Derive macro for the Reflect trait.
///
/// Generates a record declaration for the struct together with
/// `structure()`, `reflect()` and `reify()`.
///
/// # Example
///
/// ```ignore
/// use facsimile_core::Reflect;
///
/// #[derive(Default, Reflect)]
/// struct Node {
///     pub name: String,
///     pub next: Option<Rc<RefCell<Node>>>,
///     cache: Vec<u8>,
/// }
/// ```
///
/// `pub` fields are settable and carried over by clones. Other fields are
/// part of the record but are left at their default value.
///
/// # Attributes
///
/// - `#[reflect(skip)]` - Leave this field out of the record (field must impl Default)
/// - `#[reflect(rename = "name")]` - Use custom name in the record
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_reflect_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_reflect_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let data = match &input.data {
        syn::Data::Struct(data) => data,
        syn::Data::Enum(_) => {
            return Err(syn::Error::new_spanned(input, "Reflect cannot be derived for enums"));
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(input, "Reflect cannot be derived for unions"));
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Reflect cannot be derived for generic types",
        ));
    }

    let name = &input.ident;
    let fields = record::collect_fields(&data.fields)?;

    let record_fn = record::generate_record(name, &fields);
    let reflect_fn = generate_reflect(&fields);
    let reify_fn = generate_reify(&data.fields, &fields);

    Ok(quote! {
        const _: () = {
            #record_fn

            impl ::facsimile_core::Reflect for #name {
                fn structure() -> ::facsimile_core::Structure {
                    ::facsimile_core::Structure::Record(record())
                }

                #reflect_fn

                #reify_fn
            }
        };
    })
}

fn generate_reflect(fields: &[RecordField]) -> proc_macro2::TokenStream {
    let values: Vec<_> = fields
        .iter()
        .filter(|f| !f.skip)
        .map(|f| {
            let member = &f.member;
            let ty = &f.ty;
            quote! { <#ty as ::facsimile_core::Reflect>::reflect(&self.#member, reflector) }
        })
        .collect();

    quote! {
        #[allow(unused_variables)]
        fn reflect(&self, reflector: &mut ::facsimile_core::Reflector) -> ::facsimile_core::Value {
            let values = ::std::vec![#(#values),*];
            ::facsimile_core::reflect::record_value(&record(), values)
        }
    }
}

fn generate_reify(shape: &syn::Fields, fields: &[RecordField]) -> proc_macro2::TokenStream {
    let inits: Vec<_> = fields
        .iter()
        .map(|f| {
            let ty = &f.ty;
            if f.skip {
                quote! { ::std::default::Default::default() }
            } else if f.settable {
                quote! {
                    <#ty as ::facsimile_core::Reflect>::reify(
                        values.next().unwrap_or_default(),
                        reifier,
                    )?
                }
            } else {
                // Present in the record but never carried over.
                quote! {{
                    let _ = values.next();
                    ::std::default::Default::default()
                }}
            }
        })
        .collect();

    let construction = match shape {
        syn::Fields::Named(_) => {
            let members = fields.iter().map(|f| &f.member);
            quote! { Self { #(#members: #inits),* } }
        }
        syn::Fields::Unnamed(_) => quote! { Self(#(#inits),*) },
        syn::Fields::Unit => quote! { Self },
    };

    quote! {
        #[allow(unused_mut, unused_variables)]
        fn reify(
            value: ::facsimile_core::Value,
            reifier: &mut ::facsimile_core::Reifier,
        ) -> ::std::result::Result<Self, ::facsimile_core::CoerceError> {
            let mut values = ::facsimile_core::reflect::record_values(value, &record())?;
            ::std::result::Result::Ok(#construction)
        }
    }
}
