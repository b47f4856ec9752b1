use crate::attributes::{HookKind, ServiceAttributes};
use convert_case::{Case, Casing};
use itertools::Itertools;
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::spanned::Spanned;
use syn::{
    Attribute, Data, DataStruct, DeriveInput, Error, Expr, ExprArray, ExprLit, Fields, Lit, LitStr,
    Result,
};

const SERVICE: &str = "service";

fn extract_service_attributes(attributes: &[Attribute]) -> Result<ServiceAttributes> {
    attributes
        .iter()
        .filter(|attribute| attribute.path().is_ident(SERVICE))
        .map(ServiceAttributes::try_from)
        .next()
        .transpose()
        .map(Option::unwrap_or_default)
}

fn generate_name(name: Option<&LitStr>, ident: &Ident) -> Result<String> {
    match name {
        Some(name) if name.value().trim().is_empty() => {
            Err(Error::new(name.span(), "Service name cannot be empty!"))
        }
        Some(name) => Ok(name.value()),
        None => Ok(ident.to_string().to_case(Case::Snake)),
    }
}

fn generate_prerequisites(prerequisites: Option<&ExprArray>) -> Result<Vec<String>> {
    prerequisites
        .map(|prerequisites| {
            prerequisites
                .elems
                .iter()
                .map(|elem| {
                    if let Expr::Lit(ExprLit {
                        lit: Lit::Str(string),
                        ..
                    }) = elem
                    {
                        Ok(string.value())
                    } else {
                        Err(Error::new(
                            elem.span(),
                            "Prerequisites must be string literals!",
                        ))
                    }
                })
                .try_collect()
        })
        .unwrap_or_else(|| Ok(vec![]))
}

fn generate_construction(attributes: &ServiceAttributes, fields: &Fields) -> TokenStream {
    match (&attributes.constructor, fields) {
        (Some(constructor), _) => quote!(#constructor()),
        (None, Fields::Unit) => quote!(Ok(Self)),
        (None, _) => quote!(Ok(std::default::Default::default())),
    }
}

fn generate_hooks(attributes: &ServiceAttributes) -> TokenStream {
    let startup = attributes.startup.map(|kind| match kind {
        HookKind::Sync => quote!(.startup()),
        HookKind::Async => quote!(.async_startup()),
    });
    let shutdown = attributes.shutdown.map(|kind| match kind {
        HookKind::Sync => quote!(.shutdown()),
        HookKind::Async => quote!(.async_shutdown()),
    });

    quote!(#startup #shutdown)
}

pub fn expand_service(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(DataStruct { fields, .. }) = &input.data else {
        return Err(Error::new(input.span(), "Can only derive Service on structs!"));
    };

    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Cannot derive Service for generic types!",
        ));
    }

    let ident = &input.ident;
    let attributes = extract_service_attributes(&input.attrs)?;
    let name = generate_name(attributes.name.as_ref(), ident)?;
    let prerequisites = generate_prerequisites(attributes.prerequisites.as_ref())?;
    let construction = generate_construction(&attributes, fields);
    let hooks = generate_hooks(&attributes);

    let skip_if_prerequisite_missing = attributes
        .skip_if_prerequisite_missing
        .then(|| quote!(.skip_if_prerequisite_missing()));
    let skip_await = attributes
        .skip_await
        .then(|| quote!(.skip_await_on_startup()));
    let scheduler = attributes
        .scheduler
        .as_ref()
        .map(|scheduler| quote!(.with_scheduler_affinity(#scheduler)));

    Ok(quote! {
        #[automatically_derived]
        impl ignition_service::registration::ServiceDefinition for #ident {
            fn descriptor() -> ignition_service::descriptor::ServiceDescriptor {
                ignition_service::descriptor::ServiceDescriptor::new(#name)
                    #(.with_prerequisite(#prerequisites))*
                    #skip_if_prerequisite_missing
                    #skip_await
                    #scheduler
            }

            fn create() -> Result<Self, ignition_service::error::ErrorPtr> {
                #construction
            }

            fn registration(
                instance: std::sync::Arc<Self>,
            ) -> ignition_service::registration::ServiceRegistration {
                ignition_service::registration::ServiceRegistration::builder(
                    <Self as ignition_service::registration::ServiceDefinition>::descriptor(),
                    instance,
                )
                #hooks
                .build()
            }
        }

        const _: () = {
            fn register() -> Result<
                ignition_service::registration::ServiceRegistration,
                ignition_service::error::ErrorPtr,
            > {
                <#ident as ignition_service::registration::ServiceDefinition>::register()
            }

            ignition_service::registration::internal::submit! {
                ignition_service::registration::internal::ServiceRegisterer {
                    register
                }
            };
        };
    })
}
