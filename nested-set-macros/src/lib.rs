use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Path, Type,
};

#[proc_macro_derive(NestedSetModel, attributes(nested_set))]
pub fn derive_nested_set_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_nested_set_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    id_type: Option<Type>,
    parent_field: Option<String>,
    left_field: Option<String>,
    right_field: Option<String>,
    depth_field: Option<String>,
    entity_name: Option<String>,
    tombstone_field: Option<String>,
    tombstone_mark: Option<Path>,
}

fn impl_nested_set_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "NestedSetModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("nested_set") {
            parse_nested_set_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let parent_field_name = options
        .parent_field
        .unwrap_or_else(|| "parent_id".to_string());
    let left_field_name = options.left_field.unwrap_or_else(|| "lft".to_string());
    let right_field_name = options.right_field.unwrap_or_else(|| "rgt".to_string());
    let depth_field_name = options.depth_field.unwrap_or_else(|| "depth".to_string());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let parent_field_ident = Ident::new(&parent_field_name, struct_ident.span());
    let left_field_ident = Ident::new(&left_field_name, struct_ident.span());
    let right_field_ident = Ident::new(&right_field_name, struct_ident.span());
    let depth_field_ident = Ident::new(&depth_field_name, struct_ident.span());

    let fields = match &data_struct.fields {
        Fields::Named(fields) => fields,
        other => {
            return Err(syn::Error::new(
                other.span(),
                "NestedSetModel requires named fields",
            ))
        }
    };

    let field_type = |name: &str| -> Option<Type> {
        fields
            .named
            .iter()
            .find(|field| field.ident.as_ref().is_some_and(|ident| ident == name))
            .map(|field| field.ty.clone())
    };

    let id_type = options
        .id_type
        .clone()
        .or_else(|| field_type(&id_field_name))
        .ok_or_else(|| {
            syn::Error::new(
                struct_ident.span(),
                "Unable to determine id field type; specify `id_type = ...` in #[nested_set]",
            )
        })?;

    for required in [
        &parent_field_name,
        &left_field_name,
        &right_field_name,
        &depth_field_name,
    ] {
        if field_type(required).is_none() {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("NestedSetModel expects a `{required}` field"),
            ));
        }
    }

    let entity_name = options
        .entity_name
        .or(table_name)
        .unwrap_or_else(|| struct_ident.to_string());
    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let parent_column_variant = format_ident!("{}", to_pascal_case(&parent_field_name));
    let left_column_variant = format_ident!("{}", to_pascal_case(&left_field_name));
    let right_column_variant = format_ident!("{}", to_pascal_case(&right_field_name));
    let depth_column_variant = format_ident!("{}", to_pascal_case(&depth_field_name));

    let tombstone = match (options.tombstone_field, options.tombstone_mark) {
        (Some(field), Some(mark)) => {
            let ty = field_type(&field).ok_or_else(|| {
                syn::Error::new(
                    struct_ident.span(),
                    format!("tombstone_field `{field}` is not a field of this model"),
                )
            })?;
            Some((field, ty, mark))
        }
        (Some(_), None) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                "`tombstone_field` requires `tombstone_mark = \"path::to::fn\"`",
            ))
        }
        (None, Some(_)) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                "`tombstone_mark` requires `tombstone_field`",
            ))
        }
        (None, None) => None,
    };

    let visibility = tombstone.as_ref().map(|(field, _, _)| {
        let variant = format_ident!("{}", to_pascal_case(field));
        quote! {
            fn visibility() -> ::sea_orm::Condition {
                ::sea_orm::Condition::all()
                    .add(::sea_orm::ColumnTrait::is_null(&Column::#variant))
            }
        }
    });

    let tombstone_impl = tombstone.as_ref().map(|(field, ty, mark)| {
        let field_ident = Ident::new(field, struct_ident.span());
        let variant = format_ident!("{}", to_pascal_case(field));
        quote! {
            impl ::nested_set::HasTombstone for #struct_ident {
                fn tombstone_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                    Column::#variant
                }

                fn is_tombstoned(&self) -> bool {
                    self.#field_ident.is_some()
                }

                fn tombstone_mark() -> ::sea_orm::Value {
                    #mark()
                }

                fn cleared_tombstone() -> ::sea_orm::Value {
                    ::sea_orm::Value::from(<#ty as ::core::default::Default>::default())
                }
            }
        }
    });

    let generated = quote! {
        impl ::nested_set::NodeRecord for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;
            type Id = #id_type;

            fn nested_set_config() -> ::nested_set::NestedSetConfig {
                ::nested_set::NestedSetConfig::new(#entity_name_literal)
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn active_id(active: &Self::ActiveModel) -> ::core::option::Option<Self::Id> {
                match &active.#id_field_ident {
                    ::sea_orm::ActiveValue::Set(id) | ::sea_orm::ActiveValue::Unchanged(id) => {
                        ::core::option::Option::Some(id.clone())
                    }
                    ::sea_orm::ActiveValue::NotSet => ::core::option::Option::None,
                }
            }

            #visibility
        }

        impl ::nested_set::HasParentRef for #struct_ident {
            fn parent_id(&self) -> ::core::option::Option<Self::Id> {
                self.#parent_field_ident.clone()
            }

            fn parent_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#parent_column_variant
            }

            fn parent_to_value(parent: ::core::option::Option<Self::Id>) -> ::sea_orm::Value {
                ::sea_orm::Value::from(parent)
            }

            fn set_parent(active: &mut Self::ActiveModel, parent: ::core::option::Option<Self::Id>) {
                active.#parent_field_ident = ::sea_orm::ActiveValue::Set(parent);
            }
        }

        impl ::nested_set::HasBoundaries for #struct_ident {
            fn left(&self) -> i32 {
                self.#left_field_ident
            }

            fn right(&self) -> i32 {
                self.#right_field_ident
            }

            fn depth(&self) -> i32 {
                self.#depth_field_ident
            }

            fn left_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#left_column_variant
            }

            fn right_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#right_column_variant
            }

            fn depth_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#depth_column_variant
            }

            fn set_boundaries(active: &mut Self::ActiveModel, left: i32, right: i32, depth: i32) {
                active.#left_field_ident = ::sea_orm::ActiveValue::Set(left);
                active.#right_field_ident = ::sea_orm::ActiveValue::Set(right);
                active.#depth_field_ident = ::sea_orm::ActiveValue::Set(depth);
            }

            fn clear_boundaries(active: &mut Self::ActiveModel) {
                active.#left_field_ident = ::sea_orm::ActiveValue::NotSet;
                active.#right_field_ident = ::sea_orm::ActiveValue::NotSet;
                active.#depth_field_ident = ::sea_orm::ActiveValue::NotSet;
            }
        }

        #tombstone_impl
    };

    Ok(generated.into())
}

fn parse_nested_set_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "id_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.id_field = Some(value.value());
            }
            "id_type" => {
                let ty: Type = meta.value()?.parse()?;
                options.id_type = Some(ty);
            }
            "parent_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.parent_field = Some(value.value());
            }
            "left_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.left_field = Some(value.value());
            }
            "right_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.right_field = Some(value.value());
            }
            "depth_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.depth_field = Some(value.value());
            }
            "entity_name" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.entity_name = Some(value.value());
            }
            "tombstone_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.tombstone_field = Some(value.value());
            }
            "tombstone_mark" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.tombstone_mark = Some(parse_path(&value.value(), value.span())?);
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported nested_set option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            // Skip other `key = value` options such as `schema_name`.
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn parse_path(value: &str, span: proc_macro2::Span) -> syn::Result<Path> {
    syn::parse_str::<Path>(value).map_err(|_| syn::Error::new(span, "Invalid path"))
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
