use super::{init_signing_test, s3_doc_signer, test_signer, AWS_DOC_ACCESS_KEY};
use anyhow::Result;
use async_trait::async_trait;
use awssig_core::hash::{hex_hmac_sha256, hex_sha256, EMPTY_SHA256};
use awssig_core::{Context, ErrorKind, ProvideCredential, SignableBody, SignableRequest};
use awssig_v4::{generate_signing_key, Credential, SigningAlgorithm, Signer};
use chrono::{TimeZone, Utc};
use http::{HeaderMap, Method};
use pretty_assertions::assert_eq;
use std::io::{Cursor, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};

fn fixed_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 3, 1, 8, 12, 34).unwrap()
}

#[tokio::test]
async fn test_iam_documented_example() -> Result<()> {
    init_signing_test();

    // https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_sigv-create-signed-request.html
    let signer = Signer::builder()
        .service("iam")
        .region("us-east-1")
        .access_key_id("AKIDEXAMPLE")
        .secret_access_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
        .apply_checksum_header(false)
        .build()?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        "application/x-www-form-urlencoded; charset=utf-8".parse()?,
    );
    headers.insert("x-amz-date", "20150830T123600Z".parse()?);

    let mut req = SignableRequest::new(
        Method::GET,
        "https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08",
    )
    .with_headers(&headers);
    let sig = signer.sign_request(&mut req).await?;

    assert_eq!(
        sig.canonical_request,
        "GET\n/\nAction=ListUsers&Version=2010-05-08\ncontent-type:application/x-www-form-urlencoded; charset=utf-8\nhost:iam.amazonaws.com\nx-amz-date:20150830T123600Z\n\ncontent-type;host;x-amz-date\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        sig.string_to_sign,
        "AWS4-HMAC-SHA256\n20150830T123600Z\n20150830/us-east-1/iam/aws4_request\nf536975d06c0309214f805bb90ccff089219ecd68b2577efef23edd43b7e1a59"
    );
    assert_eq!(
        sig.headers["authorization"].to_str()?,
        "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, SignedHeaders=content-type;host;x-amz-date, Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
    );
    assert!(!sig.headers.contains_key("x-amz-content-sha256"));
    Ok(())
}

#[tokio::test]
async fn test_s3_get_object_documented_example() -> Result<()> {
    // https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html
    let signer = s3_doc_signer()?;

    let mut headers = HeaderMap::new();
    headers.insert("range", "bytes=0-9".parse()?);

    let mut req = SignableRequest::new(Method::GET, "https://examplebucket.s3.amazonaws.com/test.txt")
        .with_headers(&headers);
    let sig = signer.sign_request(&mut req).await?;

    assert_eq!(sig.headers["x-amz-content-sha256"], EMPTY_SHA256);
    assert_eq!(sig.headers["x-amz-date"], "20130524T000000Z");
    assert_eq!(
        sig.headers["authorization"].to_str()?,
        format!("AWS4-HMAC-SHA256 Credential={AWS_DOC_ACCESS_KEY}/20130524/us-east-1/s3/aws4_request, SignedHeaders=host;range;x-amz-content-sha256;x-amz-date, Signature=f0e8bdb87c964420e857bd35b5d6ed310bd44f0170aba48dd91039c6036bdb41")
    );
    Ok(())
}

#[tokio::test]
async fn test_s3_put_object_documented_example() -> Result<()> {
    // https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html
    let signer = s3_doc_signer()?;

    let mut headers = HeaderMap::new();
    headers.insert("date", "Fri, 24 May 2013 00:00:00 GMT".parse()?);
    headers.insert("x-amz-storage-class", "REDUCED_REDUNDANCY".parse()?);

    let body = b"Welcome to Amazon S3.";
    let mut req = SignableRequest::new(
        Method::PUT,
        "https://examplebucket.s3.amazonaws.com/test%24file.text",
    )
    .with_headers(&headers)
    .with_body(SignableBody::Bytes(body));
    let sig = signer.sign_request(&mut req).await?;

    assert_eq!(
        sig.content_sha256,
        "44ce7dd67c959e0d3524ffac1771dfbba87d2b6b4b4e99e42034a8b803f8b072"
    );
    assert_eq!(
        sig.headers["authorization"].to_str()?,
        format!("AWS4-HMAC-SHA256 Credential={AWS_DOC_ACCESS_KEY}/20130524/us-east-1/s3/aws4_request, SignedHeaders=date;host;x-amz-content-sha256;x-amz-date;x-amz-storage-class, Signature=98ad721746da40c64f1a55b78f14c238d841ea1380cd77a1b5971af0ece108bd")
    );
    Ok(())
}

#[tokio::test]
async fn test_signing_is_deterministic() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut headers = HeaderMap::new();
    headers.insert("x-amz-meta-a", "1".parse()?);

    let mut first = SignableRequest::new(Method::POST, "https://example.com/a/b?z=1&a=2")
        .with_headers(&headers)
        .with_body(SignableBody::Bytes(b"payload"));
    let mut second = SignableRequest::new(Method::POST, "https://example.com/a/b?z=1&a=2")
        .with_headers(&headers)
        .with_body(SignableBody::Bytes(b"payload"));

    let first = signer.sign_request(&mut first).await?;
    let second = signer.sign_request(&mut second).await?;
    assert_eq!(first.signature, second.signature);
    assert_eq!(first.canonical_request, second.canonical_request);
    assert_eq!(first.headers, second.headers);
    Ok(())
}

#[tokio::test]
async fn test_signature_can_be_rederived() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let sig = signer.sign_request(&mut req).await?;

    let lines: Vec<&str> = sig.string_to_sign.split('\n').collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "AWS4-HMAC-SHA256");
    assert_eq!(lines[1], "20220301T081234Z");
    assert_eq!(lines[2], "20220301/us-west-2/service/aws4_request");
    assert_eq!(lines[3], hex_sha256(sig.canonical_request.as_bytes()));

    let key = generate_signing_key("secret_access_key", "20220301", "us-west-2", "service");
    assert_eq!(
        sig.signature,
        hex_hmac_sha256(&key, sig.string_to_sign.as_bytes())
    );
    Ok(())
}

#[tokio::test]
async fn test_query_is_sorted() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut req = SignableRequest::new(Method::GET, "https://example.com/?b=2&a=1&a=0&acl");
    let sig = signer.sign_request(&mut req).await?;

    let query = sig.canonical_request.split('\n').nth(2).unwrap_or_default();
    assert_eq!(query, "a=0&a=1&acl=&b=2");
    Ok(())
}

#[tokio::test]
async fn test_header_values_are_canonicalized() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut headers = HeaderMap::new();
    headers.insert("X-Amz-Meta-Spaced", "  a   b  c ".parse()?);

    let mut req = SignableRequest::new(Method::GET, "https://example.com/").with_headers(&headers);
    let sig = signer.sign_request(&mut req).await?;

    assert!(sig.canonical_request.contains("\nx-amz-meta-spaced:a b c\n"));
    Ok(())
}

#[tokio::test]
async fn test_unsigned_headers_are_excluded() -> Result<()> {
    init_signing_test();
    let signer = Signer::builder()
        .service("service")
        .region("us-west-2")
        .access_key_id("access_key_id")
        .secret_access_key("secret_access_key")
        .unsigned_header("X-Custom-Unsigned")
        .time(fixed_time())
        .build()?;

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "stale".parse()?);
    headers.insert("x-amzn-trace-id", "Root=1".parse()?);
    headers.insert("expect", "100-continue".parse()?);
    headers.insert("x-custom-unsigned", "v".parse()?);
    headers.insert("x-custom-signed", "v".parse()?);

    let mut req = SignableRequest::new(Method::PUT, "https://example.com/").with_headers(&headers);
    let sig = signer.sign_request(&mut req).await?;

    let authorization = sig.headers["authorization"].to_str()?;
    assert!(authorization
        .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-custom-signed,"));
    for name in ["authorization:", "x-amzn-trace-id", "expect", "x-custom-unsigned"] {
        assert!(
            !sig.canonical_request.contains(name),
            "{name} must not be signed"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_empty_body_hash() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let sig = signer.sign_request(&mut req).await?;
    assert_eq!(sig.content_sha256, EMPTY_SHA256);

    let mut req =
        SignableRequest::new(Method::GET, "https://example.com/").with_body(SignableBody::Bytes(b""));
    let sig = signer.sign_request(&mut req).await?;
    assert_eq!(sig.content_sha256, EMPTY_SHA256);
    Ok(())
}

#[tokio::test]
async fn test_stream_body_is_rewound() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut body = Cursor::new(b"skip:Hello, World!".to_vec());
    body.seek(SeekFrom::Start(5))?;

    let sig = {
        let mut req = SignableRequest::new(Method::PUT, "https://example.com/hello")
            .with_body(SignableBody::Stream(&mut body));
        signer.sign_request(&mut req).await?
    };

    assert_eq!(sig.content_sha256, hex_sha256(b"Hello, World!"));
    assert_eq!(body.position(), 5);
    Ok(())
}

#[tokio::test]
async fn test_precomputed_body_hash() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut req = SignableRequest::new(Method::PUT, "https://example.com/hello")
        .with_body(SignableBody::Precomputed("UNSIGNED-PAYLOAD".into()));
    let sig = signer.sign_request(&mut req).await?;

    assert_eq!(sig.headers["x-amz-content-sha256"], "UNSIGNED-PAYLOAD");
    assert!(sig.canonical_request.ends_with("\nUNSIGNED-PAYLOAD"));
    Ok(())
}

#[tokio::test]
async fn test_session_token_header() -> Result<()> {
    init_signing_test();
    let builder = || {
        Signer::builder()
            .service("s3")
            .region("us-east-1")
            .credential(Credential::new("ak", "sk").with_session_token("session"))
            .time(fixed_time())
    };

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let sig = builder().build()?.sign_request(&mut req).await?;
    assert_eq!(sig.headers["x-amz-security-token"], "session");
    assert!(sig.headers["x-amz-security-token"].is_sensitive());
    assert!(sig.canonical_request.contains("\nx-amz-security-token:session\n"));

    let sig = builder()
        .signing_algorithm(SigningAlgorithm::SigV4S3Express)
        .build()?
        .sign_request(&mut req)
        .await?;
    assert_eq!(sig.headers["x-amz-s3session-token"], "session");
    assert!(!sig.headers.contains_key("x-amz-security-token"));

    Ok(())
}

#[tokio::test]
async fn test_omitted_session_token_is_sent_unsigned() -> Result<()> {
    init_signing_test();
    let builder = || {
        Signer::builder()
            .service("s3")
            .region("us-east-1")
            .credential(Credential::new("ak", "sk").with_session_token("session"))
            .time(fixed_time())
    };

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let sig = builder()
        .omit_session_token(true)
        .build()?
        .sign_request(&mut req)
        .await?;
    assert_eq!(sig.headers["x-amz-security-token"], "session");
    assert!(sig.headers["x-amz-security-token"].is_sensitive());
    assert!(!sig.canonical_request.contains("session"));
    assert!(sig.headers["authorization"]
        .to_str()?
        .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date,"));

    // Same signature as a signer that never had a token.
    let plain = Signer::builder()
        .service("s3")
        .region("us-east-1")
        .credential(Credential::new("ak", "sk"))
        .time(fixed_time())
        .build()?
        .sign_request(&mut req)
        .await?;
    assert_eq!(sig.signature, plain.signature);

    let sig = builder()
        .signing_algorithm(SigningAlgorithm::SigV4S3Express)
        .omit_session_token(true)
        .build()?
        .sign_request(&mut req)
        .await?;
    assert_eq!(sig.headers["x-amz-s3session-token"], "session");
    assert!(!sig.canonical_request.contains("session"));
    Ok(())
}

#[tokio::test]
async fn test_caller_host_header_wins() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut headers = HeaderMap::new();
    headers.insert("host", "virtual.example.com".parse()?);

    let mut req =
        SignableRequest::new(Method::GET, "http://127.0.0.1:9000/").with_headers(&headers);
    let sig = signer.sign_request(&mut req).await?;
    assert_eq!(sig.headers["host"], "virtual.example.com");

    let mut req = SignableRequest::new(Method::GET, "http://127.0.0.1:9000/");
    let sig = signer.sign_request(&mut req).await?;
    assert_eq!(sig.headers["host"], "127.0.0.1:9000");
    Ok(())
}

#[tokio::test]
async fn test_invalid_requests() -> Result<()> {
    let signer = test_signer(fixed_time())?;

    let mut req = SignableRequest::new(Method::GET, "");
    let err = signer.sign_request(&mut req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RequestInvalid);

    let mut req = SignableRequest::new(Method::GET, "/relative/path");
    let err = signer.sign_request(&mut req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UrlInvalid);
    Ok(())
}

#[test]
fn test_missing_credentials_at_construction() {
    let err = Signer::builder()
        .service("s3")
        .region("us-east-1")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialMissing);
}

/// Hands out a new access key id on every call.
#[derive(Debug, Default)]
struct RotatingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl ProvideCredential for RotatingProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> awssig_core::Result<Option<Credential>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Credential::new(&format!("ak{n}"), "sk")))
    }
}

#[tokio::test]
async fn test_credentials_are_fetched_per_call() -> Result<()> {
    init_signing_test();
    let signer = Signer::builder()
        .service("s3")
        .region("us-east-1")
        .credential_provider(RotatingProvider::default())
        .time(fixed_time())
        .build()?;

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let first = signer.sign_request(&mut req).await?;
    let second = signer.sign_request(&mut req).await?;

    assert!(first.headers["authorization"]
        .to_str()?
        .contains("Credential=ak0/"));
    assert!(second.headers["authorization"]
        .to_str()?
        .contains("Credential=ak1/"));
    Ok(())
}

/// Never has anything to offer.
#[derive(Debug)]
struct EmptyProvider;

#[async_trait]
impl ProvideCredential for EmptyProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> awssig_core::Result<Option<Credential>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_missing_credentials_at_signing() -> Result<()> {
    init_signing_test();
    let signer = Signer::builder()
        .service("s3")
        .region("us-east-1")
        .credential_provider(EmptyProvider)
        .build()?;

    let mut req = SignableRequest::new(Method::GET, "https://example.com/");
    let err = signer.sign_request(&mut req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CredentialMissing);
    assert_eq!(
        err.message(),
        "unable to sign request without credentials set"
    );
    Ok(())
}
