// src/cert/openssl.rs
use super::identity::Identity;
use super::types::{KeyAlgorithm, KeyUsage};
use crate::error::{PkiError, Result};
use crate::utils::logging::Logger;
use chrono::{DateTime, Duration, Utc};
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    ec::{Asn1Flag, EcGroup, EcKey},
    error::ErrorStack,
    hash::MessageDigest,
    nid::Nid,
    pkey::{Id, PKey, PKeyRef, Private},
    rsa::Rsa,
    stack::Stack,
    x509::{
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage as KeyUsageExt,
            SubjectAlternativeName, SubjectKeyIdentifier,
        },
        X509Builder, X509Extension, X509Name, X509NameBuilder, X509Ref, X509Req, X509ReqBuilder,
        X509ReqRef, X509,
    },
};

fn keygen_error(e: ErrorStack) -> PkiError {
    PkiError::KeyGeneration(e.to_string())
}

fn sign_error(e: ErrorStack) -> PkiError {
    PkiError::Sign(e.to_string())
}

pub fn generate_private_key(
    algorithm: KeyAlgorithm,
    logger: &mut dyn Logger,
) -> Result<PKey<Private>> {
    algorithm.validate()?;
    logger.debug_log(&format!("Generating {} private key", algorithm));

    let key = match algorithm {
        KeyAlgorithm::Ecdsa { size } => {
            let curve = if size == 384 {
                Nid::SECP384R1
            } else {
                Nid::X9_62_PRIME256V1
            };
            let mut group = EcGroup::from_curve_name(curve).map_err(keygen_error)?;
            group.set_asn1_flag(Asn1Flag::NAMED_CURVE);
            EcKey::generate(&group)
                .and_then(PKey::from_ec_key)
                .map_err(keygen_error)?
        }
        KeyAlgorithm::Rsa { size } => Rsa::generate(size)
            .and_then(PKey::from_rsa)
            .map_err(keygen_error)?,
    };

    Ok(key)
}

/// SEC1 `EC PRIVATE KEY` for ECDSA keys, PKCS#1 `RSA PRIVATE KEY` for RSA.
pub fn private_key_to_pem(key: &PKeyRef<Private>) -> Result<String> {
    let pem = match key.id() {
        Id::EC => key.ec_key().and_then(|ec| ec.private_key_to_pem()),
        Id::RSA => key.rsa().and_then(|rsa| rsa.private_key_to_pem()),
        _ => key.private_key_to_pem_pkcs8(),
    }
    .map_err(keygen_error)?;
    pem_string(pem, "private key")
}

pub fn private_key_from_pem(pem: &str) -> Result<PKey<Private>> {
    PKey::private_key_from_pem(pem.as_bytes()).map_err(|e| PkiError::parse("private key", e))
}

pub fn certificate_to_pem(cert: &X509Ref) -> Result<String> {
    pem_string(cert.to_pem().map_err(sign_error)?, "certificate")
}

pub fn certificate_from_pem(what: &str, pem: &str) -> Result<X509> {
    if pem.trim().is_empty() {
        return Err(PkiError::parse(what, "empty PEM"));
    }
    X509::from_pem(pem.as_bytes()).map_err(|e| PkiError::parse(what, e))
}

fn pem_string(pem: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(pem).map_err(|e| PkiError::parse(what, e))
}

/// Signature digest matching the strength of the signing key.
pub fn digest_for(key: &PKeyRef<Private>) -> MessageDigest {
    if key.id() == Id::EC && key.bits() >= 384 {
        MessageDigest::sha384()
    } else {
        MessageDigest::sha256()
    }
}

fn subject_name(common_name: &str, organizations: &[String]) -> std::result::Result<X509Name, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    for organization in organizations {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)?;
    }
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    Ok(name.build())
}

fn san_builder(identities: &[Identity]) -> Option<SubjectAlternativeName> {
    if identities.is_empty() {
        return None;
    }
    let mut san = SubjectAlternativeName::new();
    for identity in identities {
        match identity {
            Identity::Dns(name) => san.dns(name),
            Identity::Ip(ip) => san.ip(&ip.to_string()),
        };
    }
    Some(san)
}

/// Builds and self-signs a PKCS#10 request for `key`.
pub fn generate_csr(
    common_name: &str,
    organizations: &[String],
    identities: &[Identity],
    key: &PKeyRef<Private>,
    logger: &mut dyn Logger,
) -> Result<X509Req> {
    logger.debug_log(&format!(
        "Generating CSR for {} with {} SAN entries",
        common_name,
        identities.len()
    ));

    let build = || -> std::result::Result<X509Req, ErrorStack> {
        let mut builder = X509ReqBuilder::new()?;
        builder.set_version(0)?;
        let name = subject_name(common_name, organizations)?;
        builder.set_subject_name(&name)?;
        builder.set_pubkey(key)?;

        if let Some(san) = san_builder(identities) {
            let extension = {
                let ctx = builder.x509v3_context(None);
                san.build(&ctx)?
            };
            let mut extensions = Stack::new()?;
            extensions.push(extension)?;
            builder.add_extensions(&extensions)?;
        }

        builder.sign(key, digest_for(key))?;
        Ok(builder.build())
    };

    build().map_err(|e| PkiError::Sign(format!("failed to build CSR for {}: {}", common_name, e)))
}

pub fn csr_to_pem(req: &X509ReqRef) -> Result<String> {
    pem_string(req.to_pem().map_err(sign_error)?, "certificate request")
}

/// What the issued certificate is allowed to do.
#[derive(Debug, Clone)]
pub struct CertificateProfile {
    pub is_ca: bool,
    pub usages: Vec<KeyUsage>,
    pub not_before: DateTime<Utc>,
    pub validity: Duration,
}

impl CertificateProfile {
    pub fn authority(now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            is_ca: true,
            usages: Vec::new(),
            not_before: now,
            validity,
        }
    }

    pub fn leaf(now: DateTime<Utc>, validity: Duration, usages: &[KeyUsage]) -> Self {
        Self {
            is_ca: false,
            usages: usages.to_vec(),
            not_before: now,
            validity,
        }
    }
}

/// Who signs: the request's own key, or an existing CA.
pub enum SigningAuthority<'a> {
    SelfSigned(&'a PKeyRef<Private>),
    Ca {
        cert: &'a X509Ref,
        key: &'a PKeyRef<Private>,
    },
}

fn usage_extensions(usages: &[KeyUsage]) -> std::result::Result<Vec<X509Extension>, ErrorStack> {
    let mut extensions = Vec::new();

    let mut key_usage = KeyUsageExt::new();
    key_usage.critical();
    let mut has_key_usage = false;
    let mut extended = ExtendedKeyUsage::new();
    let mut has_extended = false;

    for usage in usages {
        match usage {
            KeyUsage::DigitalSignature => {
                key_usage.digital_signature();
                has_key_usage = true;
            }
            KeyUsage::KeyEncipherment => {
                key_usage.key_encipherment();
                has_key_usage = true;
            }
            KeyUsage::ServerAuth => {
                extended.server_auth();
                has_extended = true;
            }
            KeyUsage::ClientAuth | KeyUsage::RequestheaderClient => {
                extended.client_auth();
                has_extended = true;
            }
        }
    }

    if has_key_usage {
        extensions.push(key_usage.build()?);
    }
    if has_extended {
        extensions.push(extended.build()?);
    }
    Ok(extensions)
}

/// Issues a certificate for `req`. SANs come from `identities`, which the
/// caller put into the request when building it.
pub fn sign_certificate(
    req: &X509ReqRef,
    identities: &[Identity],
    authority: SigningAuthority<'_>,
    profile: &CertificateProfile,
    logger: &mut dyn Logger,
) -> Result<X509> {
    let req_key = req.public_key().map_err(sign_error)?;
    if !req.verify(&req_key).map_err(sign_error)? {
        return Err(PkiError::Sign("CSR signature does not verify".to_string()));
    }

    let not_after = profile
        .not_before
        .checked_add_signed(profile.validity)
        .ok_or_else(|| PkiError::InputInvalid("certificate validity overflows".to_string()))?;

    logger.debug_log(&format!(
        "Signing {} certificate valid until {}",
        if profile.is_ca { "CA" } else { "leaf" },
        not_after.to_rfc3339()
    ));

    let (issuer_cert, signing_key) = match authority {
        SigningAuthority::SelfSigned(key) => (None, key),
        SigningAuthority::Ca { cert, key } => (Some(cert), key),
    };

    let build = || -> std::result::Result<X509, ErrorStack> {
        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;

        let mut serial = BigNum::new()?;
        serial.rand(159, MsbOption::MAYBE_ZERO, false)?;
        builder.set_serial_number(serial.to_asn1_integer()?.as_ref())?;

        builder.set_subject_name(req.subject_name())?;
        match issuer_cert {
            Some(cert) => builder.set_issuer_name(cert.subject_name())?,
            None => builder.set_issuer_name(req.subject_name())?,
        }
        builder.set_pubkey(&req_key)?;
        builder.set_not_before(Asn1Time::from_unix(profile.not_before.timestamp())?.as_ref())?;
        builder.set_not_after(Asn1Time::from_unix(not_after.timestamp())?.as_ref())?;

        let mut extensions = Vec::new();
        if profile.is_ca {
            extensions.push(BasicConstraints::new().critical().ca().build()?);
            extensions.push(
                KeyUsageExt::new()
                    .critical()
                    .digital_signature()
                    .key_cert_sign()
                    .crl_sign()
                    .build()?,
            );
        } else {
            extensions.push(BasicConstraints::new().critical().build()?);
            extensions.extend(usage_extensions(&profile.usages)?);
        }

        {
            let ctx = builder.x509v3_context(issuer_cert, None);
            extensions.push(SubjectKeyIdentifier::new().build(&ctx)?);
            if issuer_cert.is_some() {
                extensions.push(AuthorityKeyIdentifier::new().keyid(false).build(&ctx)?);
            }
            if let Some(san) = san_builder(identities) {
                extensions.push(san.build(&ctx)?);
            }
        }

        for extension in extensions {
            builder.append_extension(extension)?;
        }

        builder.sign(signing_key, digest_for(signing_key))?;
        Ok(builder.build())
    };

    build().map_err(sign_error)
}
