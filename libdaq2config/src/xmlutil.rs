//! Helpers over [`xmltree::Element`] for namespaced child access and the
//! application-property primitives shared by the reader and the configurator.
//!
//! The properties element of an xdaq application lives in a namespace derived
//! from the application class (`urn:xdaq-application:<class>`); that registry
//! lives in [`crate::constants::app_namespace`], so no structural inference
//! from sibling tags is needed.

use std::collections::HashMap;

use xmltree::{Element, Namespace, XMLNode};

use super::constants::app_namespace;
use super::error::PropertyError;

/// Build a namespaced element with its prefix declared locally.
pub fn new_element(prefix: &str, ns: &str, name: &str) -> Element {
    let mut namespaces = Namespace::empty();
    namespaces.put(prefix, ns);
    Element {
        prefix: Some(prefix.to_string()),
        namespace: Some(ns.to_string()),
        namespaces: Some(namespaces),
        name: name.to_string(),
        attributes: HashMap::new(),
        children: Vec::new(),
    }
}

/// Child elements matching name and namespace.
pub fn children<'a: 'b, 'b>(
    el: &'a Element,
    ns: &'b str,
    name: &'b str,
) -> impl Iterator<Item = &'a Element> + 'b {
    el.children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |c| c.name == name && c.namespace.as_deref() == Some(ns))
}

pub fn children_mut<'a: 'b, 'b>(
    el: &'a mut Element,
    ns: &'b str,
    name: &'b str,
) -> impl Iterator<Item = &'a mut Element> + 'b {
    el.children
        .iter_mut()
        .filter_map(XMLNode::as_mut_element)
        .filter(move |c| c.name == name && c.namespace.as_deref() == Some(ns))
}

pub fn find_child<'a>(el: &'a Element, ns: &str, name: &str) -> Option<&'a Element> {
    children(el, ns, name).next()
}

pub fn find_child_mut<'a>(el: &'a mut Element, ns: &str, name: &str) -> Option<&'a mut Element> {
    children_mut(el, ns, name).next()
}

/// Child element lookup by local name only, for unnamespaced item children
/// (the FMM card fields).
pub fn find_child_local<'a>(el: &'a Element, name: &str) -> Option<&'a Element> {
    el.children
        .iter()
        .filter_map(XMLNode::as_element)
        .find(|c| c.name == name)
}

pub fn find_child_local_mut<'a>(el: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    el.children
        .iter_mut()
        .filter_map(XMLNode::as_mut_element)
        .find(|c| c.name == name)
}

/// Concatenated text content, trimmed.
pub fn text_of(el: &Element) -> String {
    let mut text = String::new();
    for node in &el.children {
        if let XMLNode::Text(t) = node {
            text.push_str(t);
        }
    }
    text.trim().to_string()
}

/// Replace the text content, leaving any element children alone.
pub fn set_text(el: &mut Element, value: &str) {
    el.children.retain(|c| !matches!(c, XMLNode::Text(_)));
    el.children.push(XMLNode::Text(value.to_string()));
}

/// Find an Application child of a context by class attribute.
pub fn find_application<'a>(
    context: &'a Element,
    xdaq_ns: &str,
    class: &str,
) -> Option<&'a Element> {
    children(context, xdaq_ns, "Application")
        .find(|a| a.attributes.get("class").map(String::as_str) == Some(class))
}

pub fn find_application_mut<'a>(
    context: &'a mut Element,
    xdaq_ns: &str,
    class: &str,
) -> Option<&'a mut Element> {
    children_mut(context, xdaq_ns, "Application")
        .find(|a| a.attributes.get("class").map(String::as_str) == Some(class))
}

fn context_url(context: &Element) -> String {
    context
        .attributes
        .get("url")
        .cloned()
        .unwrap_or_else(|| "<no url>".to_string())
}

/// Set a property of an application located by class within a context.
pub fn set_property_in_app(
    context: &mut Element,
    xdaq_ns: &str,
    class: &str,
    property: &str,
    value: &str,
) -> Result<(), PropertyError> {
    let url = context_url(context);
    let app = find_application_mut(context, xdaq_ns, class).ok_or_else(|| {
        PropertyError::ApplicationNotFound {
            class: class.to_string(),
            context: url.clone(),
        }
    })?;
    set_property_in_app_element(app, class, property, value, &url)
}

/// Same as [`set_property_in_app`], operating on the application element itself.
pub fn set_property_in_app_element(
    app: &mut Element,
    class: &str,
    property: &str,
    value: &str,
    context: &str,
) -> Result<(), PropertyError> {
    let ns = app_namespace(class);
    let properties =
        find_child_mut(app, &ns, "properties").ok_or_else(|| PropertyError::MissingProperties {
            class: class.to_string(),
            context: context.to_string(),
        })?;
    let prop = find_child_mut(properties, &ns, property).ok_or_else(|| {
        PropertyError::PropertyNotFound {
            property: property.to_string(),
            class: class.to_string(),
            context: context.to_string(),
        }
    })?;
    set_text(prop, value);
    Ok(())
}

/// Detach a property element; structural inverse of [`set_property_in_app`].
pub fn remove_property_in_app(
    context: &mut Element,
    xdaq_ns: &str,
    class: &str,
    property: &str,
) -> Result<(), PropertyError> {
    let url = context_url(context);
    let app = find_application_mut(context, xdaq_ns, class).ok_or_else(|| {
        PropertyError::ApplicationNotFound {
            class: class.to_string(),
            context: url.clone(),
        }
    })?;
    remove_property_in_app_element(app, class, property, &url)
}

pub fn remove_property_in_app_element(
    app: &mut Element,
    class: &str,
    property: &str,
    context: &str,
) -> Result<(), PropertyError> {
    let ns = app_namespace(class);
    let properties =
        find_child_mut(app, &ns, "properties").ok_or_else(|| PropertyError::MissingProperties {
            class: class.to_string(),
            context: context.to_string(),
        })?;
    let before = properties.children.len();
    properties.children.retain(|c| {
        c.as_element()
            .map(|e| !(e.name == property && e.namespace.as_deref() == Some(ns.as_str())))
            .unwrap_or(true)
    });
    if properties.children.len() == before {
        return Err(PropertyError::PropertyNotFound {
            property: property.to_string(),
            class: class.to_string(),
            context: context.to_string(),
        });
    }
    Ok(())
}

/// Read a property value from an application element.
pub fn read_property_from_app(
    app: &Element,
    class: &str,
    property: &str,
) -> Result<String, PropertyError> {
    let ns = app_namespace(class);
    let properties =
        find_child(app, &ns, "properties").ok_or_else(|| PropertyError::MissingProperties {
            class: class.to_string(),
            context: "<fragment>".to_string(),
        })?;
    let prop =
        find_child(properties, &ns, property).ok_or_else(|| PropertyError::PropertyNotFound {
            property: property.to_string(),
            class: class.to_string(),
            context: "<fragment>".to_string(),
        })?;
    Ok(text_of(prop))
}

/// Parse a property value, accepting `0x` hex notation for the pool sizes.
pub fn parse_maybe_hex(property: &str, value: &str) -> Result<u64, PropertyError> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse()
    };
    parsed.map_err(|_| PropertyError::BadPropertyValue {
        property: property.to_string(),
        value: value.to_string(),
    })
}

/// Fill every `%d` placeholder of a context url with the host index.
pub fn fill_url(url: &str, index: u32) -> String {
    url.replace("%d", &index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = r#"
        <xc:Context xmlns:xc="urn:test-xdaq" url="http://RU0_SOAP_HOST_NAME:RU0_SOAP_PORT">
          <xc:Application class="ferol::FerolController" id="11" instance="0">
            <p:properties xmlns:p="urn:xdaq-application:ferol::FerolController">
              <p:slotNumber>1</p:slotNumber>
              <p:enableStream0>true</p:enableStream0>
            </p:properties>
          </xc:Application>
        </xc:Context>"#;

    fn context() -> Element {
        Element::parse(CONTEXT.as_bytes()).unwrap()
    }

    fn read_slot(ctx: &Element) -> String {
        let app = find_application(ctx, "urn:test-xdaq", "ferol::FerolController").unwrap();
        read_property_from_app(app, "ferol::FerolController", "slotNumber").unwrap()
    }

    #[test]
    fn test_child_lookup_outlives_lookup_strings() {
        let ctx = context();
        let apps: Vec<&Element> = {
            let ns = format!("urn:test-{}", "xdaq");
            children(&ctx, &ns, "Application").collect()
        };
        assert_eq!(apps.len(), 1);
        assert_eq!(
            apps[0].attributes.get("class").unwrap(),
            "ferol::FerolController"
        );
    }

    #[test]
    fn test_set_property() {
        let mut ctx = context();
        set_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "slotNumber",
            "7",
        )
        .unwrap();
        assert_eq!(read_slot(&ctx), "7");
    }

    #[test]
    fn test_set_property_is_idempotent() {
        let mut ctx = context();
        set_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "slotNumber",
            "3",
        )
        .unwrap();
        let mut once = Vec::new();
        ctx.write(&mut once).unwrap();

        set_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "slotNumber",
            "3",
        )
        .unwrap();
        let mut twice = Vec::new();
        ctx.write(&mut twice).unwrap();

        assert_eq!(once, twice);
        assert_eq!(read_slot(&ctx), "3");
    }

    #[test]
    fn test_missing_application() {
        let mut ctx = context();
        let err = set_property_in_app(&mut ctx, "urn:test-xdaq", "evb::RU", "slotNumber", "0");
        assert!(matches!(
            err,
            Err(PropertyError::ApplicationNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_property() {
        let mut ctx = context();
        let err = set_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "noSuchThing",
            "0",
        );
        assert!(matches!(err, Err(PropertyError::PropertyNotFound { .. })));
    }

    #[test]
    fn test_remove_property() {
        let mut ctx = context();
        remove_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "enableStream0",
        )
        .unwrap();
        let err = remove_property_in_app(
            &mut ctx,
            "urn:test-xdaq",
            "ferol::FerolController",
            "enableStream0",
        );
        assert!(matches!(err, Err(PropertyError::PropertyNotFound { .. })));
    }

    #[test]
    fn test_parse_maybe_hex() {
        assert_eq!(parse_maybe_hex("x", "8192").unwrap(), 8192);
        assert_eq!(parse_maybe_hex("x", "0x800000").unwrap(), 0x800000);
        assert!(parse_maybe_hex("x", "banana").is_err());
    }

    #[test]
    fn test_fill_url() {
        assert_eq!(
            fill_url("http://RU%d_SOAP_HOST_NAME:RU%d_SOAP_PORT", 3),
            "http://RU3_SOAP_HOST_NAME:RU3_SOAP_PORT"
        );
    }
}
