use syn::{Attribute, Error, ExprArray, ExprPath, LitStr};

#[derive(Clone, Copy)]
pub enum HookKind {
    Sync,
    Async,
}

impl TryFrom<&LitStr> for HookKind {
    type Error = Error;

    fn try_from(value: &LitStr) -> Result<Self, Self::Error> {
        match value.value().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            _ => Err(Error::new(
                value.span(),
                "Expected hook kind to be either \"sync\" or \"async\"!",
            )),
        }
    }
}

#[derive(Default)]
pub struct ServiceAttributes {
    pub name: Option<LitStr>,
    pub prerequisites: Option<ExprArray>,
    pub skip_if_prerequisite_missing: bool,
    pub skip_await: bool,
    pub scheduler: Option<LitStr>,
    pub startup: Option<HookKind>,
    pub shutdown: Option<HookKind>,
    pub constructor: Option<ExprPath>,
}

impl TryFrom<&Attribute> for ServiceAttributes {
    type Error = Error;

    fn try_from(value: &Attribute) -> Result<Self, Self::Error> {
        let mut attributes = Self::default();
        value.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attributes.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("prerequisites") {
                attributes.prerequisites = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("skip_if_prerequisite_missing") {
                attributes.skip_if_prerequisite_missing = true;
            } else if meta.path.is_ident("skip_await") {
                attributes.skip_await = true;
            } else if meta.path.is_ident("scheduler") {
                attributes.scheduler = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("startup") {
                let kind: LitStr = meta.value()?.parse()?;
                attributes.startup = Some(HookKind::try_from(&kind)?);
            } else if meta.path.is_ident("shutdown") {
                let kind: LitStr = meta.value()?.parse()?;
                attributes.shutdown = Some(HookKind::try_from(&kind)?);
            } else if meta.path.is_ident("constructor") {
                let constructor: LitStr = meta.value()?.parse()?;
                attributes.constructor = Some(constructor.parse()?);
            } else {
                return Err(meta.error("Unsupported service attribute!"));
            }

            Ok(())
        })?;

        Ok(attributes)
    }
}
