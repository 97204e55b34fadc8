use proc_macro2::TokenStream;
use quote::quote;
use syn::{Member, Type};

/// A struct field as seen by the derive.
pub struct RecordField {
    pub member: Member,
    pub name: String,
    pub ty: Type,
    pub settable: bool,
    pub skip: bool,
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("reflect") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `skip` or `rename`"))
            }
        })?;
    }

    Ok(result)
}

/// Collects the fields of a struct in declaration order, skipped ones included.
pub fn collect_fields(fields: &syn::Fields) -> syn::Result<Vec<RecordField>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let attrs = parse_field_attrs(&f.attrs)?;
            let member = match &f.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(syn::Index::from(i)),
            };
            let name = attrs.rename.unwrap_or_else(|| match &f.ident {
                Some(ident) => ident.to_string(),
                None => i.to_string(),
            });
            Ok(RecordField {
                member,
                name,
                ty: f.ty.clone(),
                settable: matches!(f.vis, syn::Visibility::Public(_)),
                skip: attrs.skip,
            })
        })
        .collect()
}

/// Generates the `record()` accessor shared by the generated methods.
///
/// The declaration is created once per type and its field list is built on
/// first use, so a field may name the type it belongs to.
pub fn generate_record(self_type: &syn::Ident, fields: &[RecordField]) -> TokenStream {
    let record_name = self_type.to_string();
    let entries: Vec<_> = fields
        .iter()
        .filter(|f| !f.skip)
        .map(|f| {
            let name = &f.name;
            let ty = &f.ty;
            let settable = f.settable;
            quote! {
                ::facsimile_core::Field::new(
                    #name,
                    <#ty as ::facsimile_core::Reflect>::structure(),
                    #settable,
                )
            }
        })
        .collect();

    quote! {
        fn record() -> ::facsimile_core::RecordType {
            static RECORD: ::std::sync::OnceLock<::facsimile_core::RecordType> =
                ::std::sync::OnceLock::new();
            RECORD
                .get_or_init(|| {
                    ::facsimile_core::RecordType::deferred(#record_name, || {
                        ::std::vec![#(#entries),*]
                    })
                })
                .clone()
        }
    }
}
