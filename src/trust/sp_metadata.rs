//! Service Provider metadata document.

use std::fmt::Write;

use super::config::SpConfig;
use crate::cert::pem_body;
use crate::spid::{
    ATTRNAME_FORMAT_BASIC, DS_NS, HTTP_POST_BINDING, HTTP_REDIRECT_BINDING, MD_NS,
    NAMEID_FORMAT_TRANSIENT, SAMLP_NS,
};
use crate::xml::escape;

impl SpConfig {
    /// Render the SP metadata published to the SPID federation.
    ///
    /// The document is unsigned; signing is left to the deployment tooling.
    pub fn metadata_xml(&self) -> String {
        let entity_id = escape(&self.issuer);
        let mut xml = String::new();

        // writes to a String cannot fail
        let _ = write!(
            xml,
            r#"<md:EntityDescriptor xmlns:md="{MD_NS}" xmlns:ds="{DS_NS}" entityID="{entity_id}" ID="_{id}">"#,
            id = hex::encode(self.issuer.as_bytes()).chars().take(32).collect::<String>(),
        );
        let _ = write!(
            xml,
            r#"<md:SPSSODescriptor protocolSupportEnumeration="{SAMLP_NS}" AuthnRequestsSigned="true" WantAssertionsSigned="true">"#
        );
        let _ = write!(
            xml,
            r#"<md:KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
            pem_body(&self.certificate_pem)
        );

        if let Some(logout) = &self.logout_callback_url {
            let _ = write!(
                xml,
                r#"<md:SingleLogoutService Binding="{HTTP_REDIRECT_BINDING}" Location="{}"/>"#,
                escape(logout)
            );
        }

        let _ = write!(
            xml,
            r#"<md:NameIDFormat>{NAMEID_FORMAT_TRANSIENT}</md:NameIDFormat><md:AssertionConsumerService index="0" isDefault="true" Binding="{HTTP_POST_BINDING}" Location="{}"/>"#,
            escape(&self.callback_url)
        );

        let _ = write!(
            xml,
            r#"<md:AttributeConsumingService index="{}"><md:ServiceName xml:lang="it">{}</md:ServiceName>"#,
            self.attribute_consuming_service_index,
            escape(&self.required_attributes.name)
        );
        for attribute in &self.required_attributes.attributes {
            let _ = write!(
                xml,
                r#"<md:RequestedAttribute Name="{}" NameFormat="{ATTRNAME_FORMAT_BASIC}"/>"#,
                attribute.saml_name()
            );
        }
        xml.push_str("</md:AttributeConsumingService></md:SPSSODescriptor>");

        let org = &self.organization;
        if !org.name.is_empty() {
            let _ = write!(
                xml,
                r#"<md:Organization><md:OrganizationName xml:lang="it">{}</md:OrganizationName><md:OrganizationDisplayName xml:lang="it">{}</md:OrganizationDisplayName><md:OrganizationURL xml:lang="it">{}</md:OrganizationURL></md:Organization>"#,
                escape(&org.name),
                escape(if org.display_name.is_empty() { &org.name } else { &org.display_name }),
                escape(&org.url)
            );
        }

        xml.push_str("</md:EntityDescriptor>");
        xml
    }
}
