use darling::{ast, FromDeriveInput, FromField, FromMeta};
use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Attribute, DeriveInput, Expr, Lit, Meta};

#[derive(FromDeriveInput)]
#[darling(attributes(error_meta), supports(struct_named, struct_unit))]
struct ErrorMetaInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: ast::Data<(), PropertyField>,
    code: Option<String>,
    status: Option<Expr>,
}

#[derive(FromField)]
#[darling(forward_attrs(error_property))]
struct PropertyField {
    ident: Option<syn::Ident>,
    attrs: Vec<Attribute>,
}

#[derive(Default, FromMeta)]
#[darling(default)]
struct PropertyOpts {
    name: Option<String>,
    include_if_null: bool,
}

pub fn derive_error_metadata(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ErrorMetaInput::from_derive_input(&input).and_then(|meta| generate_impl(&meta)) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.write_errors()),
    }
}

fn generate_impl(input: &ErrorMetaInput) -> darling::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let code = input.code.as_ref().map(|code| quote!(.code(#code)));
    let status = input.status.as_ref().map(status_tokens).transpose()?;

    let fields = input
        .data
        .as_ref()
        .take_struct()
        .ok_or_else(|| darling::Error::unsupported_shape("enum"))?;

    let mut mappings = Vec::new();
    let mut readers = Vec::new();
    for field in fields.fields {
        let Some(opts) = property_opts(field)? else {
            continue;
        };
        let Some(ident) = &field.ident else {
            continue;
        };
        let source = ident.unraw().to_string();

        let mut mapping = match &opts.name {
            Some(output) => quote!(::problemkit::metadata::PropertyMapping::named(#source, #output)),
            None => quote!(::problemkit::metadata::PropertyMapping::field(#source)),
        };
        if opts.include_if_null {
            mapping = quote!(#mapping.include_if_null(true));
        }
        mappings.push(quote!(.property(#mapping)));
        readers.push(quote! {
            #source => ::problemkit::metadata::to_property_value(&self.#ident),
        });
    }

    Ok(quote! {
        impl #impl_generics ::problemkit::metadata::ErrorMetadata for #name #ty_generics #where_clause {
            fn metadata() -> ::problemkit::metadata::ExceptionMetadata {
                ::problemkit::metadata::ExceptionMetadata::builder()
                    #code
                    #status
                    #(#mappings)*
                    .build()
            }

            fn property_value(
                &self,
                source: &str,
            ) -> ::core::option::Option<::problemkit::serde_json::Result<::problemkit::serde_json::Value>> {
                match source {
                    #(#readers)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}

/// `404`, `NOT_FOUND` or a `StatusCode` expression.
fn status_tokens(status: &Expr) -> darling::Result<TokenStream2> {
    match status {
        Expr::Lit(expr) => match &expr.lit {
            Lit::Int(int) => {
                let raw: u16 = int.base10_parse().map_err(darling::Error::from)?;
                if !(100..=599).contains(&raw) {
                    return Err(darling::Error::custom("status must be between 100 and 599").with_span(int));
                }
                let raw = Literal::u16_suffixed(raw);
                Ok(quote!(.status(#raw)))
            }
            other => Err(darling::Error::unexpected_lit_type(other)),
        },
        Expr::Path(path) if path.qself.is_none() && path.path.segments.len() == 1 => {
            let constant = &path.path.segments[0].ident;
            Ok(quote!(.status(::problemkit::axum::http::StatusCode::#constant)))
        }
        other => Ok(quote!(.status(#other))),
    }
}

/// `None` when the field carries no `#[error_property]`.
fn property_opts(field: &PropertyField) -> darling::Result<Option<PropertyOpts>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("error_property")) else {
        return Ok(None);
    };
    match &attr.meta {
        Meta::Path(_) => Ok(Some(PropertyOpts::default())),
        meta => PropertyOpts::from_meta(meta).map(Some),
    }
}
