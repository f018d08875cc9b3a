//! Event stream message signing.
//!
//! - [Signing event stream messages](https://docs.aws.amazon.com/transcribe/latest/dg/streaming-setting-up.html)

use aws_smithy_eventstream::frame::write_headers_to;
use aws_smithy_types::event_stream::{Header, HeaderValue};
use awssig_core::hash::{hex_sha256, hmac_sha256};
use awssig_core::time::format_iso8601;
use awssig_core::{Error, Result};
use bytes::{Bytes, BytesMut};
use log::debug;

use crate::constants::*;
use crate::signer::{date_of, Signer};

/// Header of an event stream message.
pub type EventHeader = Header;

/// Value of an event stream header.
pub type EventHeaderValue = HeaderValue;

/// EncodeHeaders turns message headers into their wire form.
///
/// [`Signer::sign_event`] hashes whatever the encoder returns, so it must be
/// the exact bytes the transport will send.
pub trait EncodeHeaders: Send + Sync {
    /// Encode headers in order.
    fn encode_headers(&self, headers: &[EventHeader]) -> Result<Bytes>;
}

/// Encoder for the `application/vnd.amazon.eventstream` header format.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStreamEncoder;

impl EncodeHeaders for EventStreamEncoder {
    fn encode_headers(&self, headers: &[EventHeader]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        write_headers_to(headers, &mut buf).map_err(|e| {
            Error::request_invalid("event headers can't be encoded").with_source(e)
        })?;
        Ok(buf.freeze())
    }
}

impl Signer {
    /// Sign an event stream message.
    ///
    /// Returns the `:date` and `:chunk-signature` headers to put on the
    /// message, and the hex signature to pass as `prior_signature` when
    /// signing the next one. The first message chains from the signature of
    /// the initial request.
    ///
    /// Messages of one stream must be signed one after another, in order.
    ///
    /// StringToSign:
    ///
    /// ```text
    /// AWS4-HMAC-SHA256-PAYLOAD
    /// 20220313T072004Z
    /// 20220313/<region>/<service>/aws4_request
    /// <prior_signature>
    /// <hashed_encoded_headers>
    /// <hashed_payload>
    /// ```
    pub async fn sign_event(
        &self,
        prior_signature: &str,
        payload: &[u8],
        encoder: &dyn EncodeHeaders,
    ) -> Result<(Vec<EventHeader>, String)> {
        let cred = self.credential().await?;

        let now = self.now();
        let datetime = format_iso8601(now);
        let date = date_of(&datetime);
        let scope = self.credential_scope(date);

        let mut headers = vec![EventHeader::new(
            EVENT_DATE_HEADER,
            EventHeaderValue::Timestamp(aws_smithy_types::DateTime::from_secs(now.timestamp())),
        )];
        let encoded_headers = encoder.encode_headers(&headers)?;

        let string_to_sign = [
            AWS4_HMAC_SHA256_PAYLOAD,
            datetime.as_str(),
            scope.as_str(),
            prior_signature,
            hex_sha256(&encoded_headers).as_str(),
            hex_sha256(payload).as_str(),
        ]
        .join("\n");
        debug!("calculated event string to sign: {string_to_sign}");

        let signature = hmac_sha256(
            &self.signing_key(&cred.secret_access_key, date),
            string_to_sign.as_bytes(),
        );
        let hex_signature = hex::encode(&signature);

        headers.push(EventHeader::new(
            EVENT_CHUNK_SIGNATURE_HEADER,
            EventHeaderValue::ByteArray(Bytes::from(signature)),
        ));

        Ok((headers, hex_signature))
    }
}
