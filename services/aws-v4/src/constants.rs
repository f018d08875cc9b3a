// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

// Algorithm names used in string to sign and authorization.
pub const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";
pub const AWS4_HMAC_SHA256_PAYLOAD: &str = "AWS4-HMAC-SHA256-PAYLOAD";
pub const AWS4_REQUEST: &str = "aws4_request";

/// Content hash sentinel for bodies that are not signed.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Expiration of presigned urls when none is given: 15 minutes.
pub const DEFAULT_PRESIGN_EXPIRES_IN_SECS: u64 = 900;

// Headers used in aws services.
pub const X_AMZ_CONTENT_SHA_256: &str = "x-amz-content-sha256";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
pub const X_AMZ_S3_SESSION_TOKEN: &str = "x-amz-s3session-token";

// Headers that are never signed.
pub const ALWAYS_UNSIGNED_HEADERS: [&str; 3] = ["authorization", "x-amzn-trace-id", "expect"];

// Query parameters used by presigned urls.
pub const X_AMZ_ALGORITHM_QUERY: &str = "X-Amz-Algorithm";
pub const X_AMZ_CREDENTIAL_QUERY: &str = "X-Amz-Credential";
pub const X_AMZ_DATE_QUERY: &str = "X-Amz-Date";
pub const X_AMZ_EXPIRES_QUERY: &str = "X-Amz-Expires";
pub const X_AMZ_SECURITY_TOKEN_QUERY: &str = "X-Amz-Security-Token";
pub const X_AMZ_S3_SESSION_TOKEN_QUERY: &str = "X-Amz-S3session-Token";
pub const X_AMZ_SIGNED_HEADERS_QUERY: &str = "X-Amz-SignedHeaders";
pub const X_AMZ_SIGNATURE_QUERY: &str = "X-Amz-Signature";

// Event stream headers.
pub const EVENT_DATE_HEADER: &str = ":date";
pub const EVENT_CHUNK_SIGNATURE_HEADER: &str = ":chunk-signature";

// Env values used in aws services.
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// - URI encode every byte except the unreserved characters: 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
///
/// Path segments and query components share this set, `/` is kept by
/// escaping segments one at a time.
pub static AWS_URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
