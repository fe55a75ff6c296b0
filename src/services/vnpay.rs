use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::VnpayConfig;

type HmacSha512 = Hmac<Sha512>;

const VNP_VERSION: &str = "2.1.0";
const VNP_COMMAND: &str = "pay";
const VNP_CURRENCY: &str = "VND";
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";
/// Redirect URLs are honoured by the gateway for 15 minutes.
pub const PAYMENT_URL_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Purchase,
    Renewal,
}

impl OrderKind {
    /// Transaction-reference prefix, used by the callback path as a
    /// secondary renewal signal next to the stored flag.
    pub fn txn_prefix(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "SUBSCRIPTION_",
            OrderKind::Renewal => "RENEW_SUBSCRIPTION_",
        }
    }

    fn order_type(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "subscription",
            OrderKind::Renewal => "renew_subscription",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRedirect {
    pub url: String,
    pub txn_ref: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless adapter for the VNPay redirect gateway: it mints signed
/// redirect URLs and verifies inbound callback signatures. Signing is a
/// pure function of the inputs, the configured secret, the clock and the
/// nonce, so `build_redirect_at` is deterministic under test.
#[derive(Clone)]
pub struct VnpayService {
    config: VnpayConfig,
}

impl VnpayService {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    pub fn build_redirect(
        &self,
        order_id: &Uuid,
        amount: u64,
        kind: OrderKind,
        client_ip: &str,
    ) -> PaymentRedirect {
        let nonce = Uuid::new_v4().simple().to_string();
        self.build_redirect_at(order_id, amount, kind, client_ip, Utc::now(), &nonce[..8])
    }

    pub fn build_redirect_at(
        &self,
        order_id: &Uuid,
        amount: u64,
        kind: OrderKind,
        client_ip: &str,
        now: DateTime<Utc>,
        nonce: &str,
    ) -> PaymentRedirect {
        let expires_at = now + Duration::minutes(PAYMENT_URL_TTL_MINUTES);
        let txn_ref = format!("{}{}{}", kind.txn_prefix(), now.format(DATE_FORMAT), nonce);

        let pairs: Vec<(String, String)> = vec![
            ("vnp_Version".into(), VNP_VERSION.into()),
            ("vnp_Command".into(), VNP_COMMAND.into()),
            ("vnp_TmnCode".into(), self.config.tmn_code.clone()),
            ("vnp_Locale".into(), self.config.locale.clone()),
            ("vnp_CurrCode".into(), VNP_CURRENCY.into()),
            ("vnp_TxnRef".into(), txn_ref.clone()),
            ("vnp_OrderInfo".into(), order_id.to_string()),
            ("vnp_OrderType".into(), kind.order_type().into()),
            // Minor-unit scaling required by the gateway.
            ("vnp_Amount".into(), (amount * 100).to_string()),
            ("vnp_ReturnUrl".into(), self.config.return_url.clone()),
            ("vnp_IpAddr".into(), client_ip.to_string()),
            ("vnp_CreateDate".into(), now.format(DATE_FORMAT).to_string()),
            (
                "vnp_ExpireDate".into(),
                expires_at.format(DATE_FORMAT).to_string(),
            ),
        ];

        let query = canonical_query(&pairs);
        let signature = self.sign(&query);

        PaymentRedirect {
            url: format!(
                "{}?{}&vnp_SecureHash={}",
                self.config.payment_url, query, signature
            ),
            txn_ref,
            expires_at,
        }
    }

    /// Recomputes the signature over everything except the hash fields
    /// and compares it to the supplied one. Nothing in the parameter set
    /// is trusted before this passes.
    pub fn verify_callback(&self, params: &HashMap<String, String>) -> bool {
        let provided = match params.get("vnp_SecureHash") {
            Some(sig) if !sig.is_empty() => sig,
            _ => return false,
        };

        let pairs: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| key.as_str() != "vnp_SecureHash" && key.as_str() != "vnp_SecureHashType")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        self.sign(&canonical_query(&pairs)) == *provided
    }

    pub(crate) fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signs an arbitrary parameter set the way the gateway does. Used by
    /// ledger tests to forge well-formed callback payloads.
    #[cfg(test)]
    pub(crate) fn sign_pairs(&self, pairs: &[(String, String)]) -> String {
        self.sign(&canonical_query(pairs))
    }
}

/// Deterministic wire form: keys sorted, values form-encoded (spaces as
/// `+`). Sorting makes the signature immune to parameter reordering.
pub(crate) fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut sorted = pairs.to_vec();
    sorted.sort();
    serde_urlencoded::to_string(&sorted).expect("string pairs always encode")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_service() -> VnpayService {
        VnpayService::new(VnpayConfig {
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "https://rently.vn/billing/return".to_string(),
            tmn_code: "RENTLY01".to_string(),
            hash_secret: "test_hash_secret".to_string(),
            locale: "vn".to_string(),
        })
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 10, 30, 0).unwrap()
    }

    fn params_of(redirect: &PaymentRedirect) -> HashMap<String, String> {
        let query = redirect.url.split('?').nth(1).unwrap();
        serde_urlencoded::from_str(query).unwrap()
    }

    #[test]
    fn test_redirect_is_deterministic_under_fixed_clock_and_nonce() {
        let service = test_service();
        let order = Uuid::new_v4();
        let first =
            service.build_redirect_at(&order, 299_000, OrderKind::Purchase, "10.1.2.3", fixed_clock(), "abc12345");
        let second =
            service.build_redirect_at(&order, 299_000, OrderKind::Purchase, "10.1.2.3", fixed_clock(), "abc12345");
        assert_eq!(first.url, second.url);
        assert_eq!(first.txn_ref, "SUBSCRIPTION_20260315103000abc12345");
        assert_eq!(first.expires_at, fixed_clock() + Duration::minutes(15));
    }

    #[test]
    fn test_redirect_carries_canonical_parameters() {
        let service = test_service();
        let order = Uuid::new_v4();
        let redirect =
            service.build_redirect_at(&order, 299_000, OrderKind::Renewal, "10.1.2.3", fixed_clock(), "ff00ff00");
        let params = params_of(&redirect);

        assert_eq!(params["vnp_Version"], "2.1.0");
        assert_eq!(params["vnp_Command"], "pay");
        assert_eq!(params["vnp_CurrCode"], "VND");
        assert_eq!(params["vnp_Amount"], "29900000");
        assert_eq!(params["vnp_OrderInfo"], order.to_string());
        assert_eq!(params["vnp_CreateDate"], "20260315103000");
        assert_eq!(params["vnp_ExpireDate"], "20260315104500");
        assert!(params["vnp_TxnRef"].starts_with("RENEW_SUBSCRIPTION_"));
        assert!(params.contains_key("vnp_SecureHash"));
    }

    #[test]
    fn test_round_trip_signature_verifies() {
        let service = test_service();
        let redirect = service.build_redirect_at(
            &Uuid::new_v4(),
            120_000,
            OrderKind::Purchase,
            "192.168.1.9",
            fixed_clock(),
            "0badcafe",
        );
        assert!(service.verify_callback(&params_of(&redirect)));
    }

    #[test]
    fn test_any_tampered_field_is_rejected() {
        let service = test_service();
        let redirect = service.build_redirect_at(
            &Uuid::new_v4(),
            120_000,
            OrderKind::Purchase,
            "192.168.1.9",
            fixed_clock(),
            "0badcafe",
        );
        let original = params_of(&redirect);

        for key in original.keys().filter(|key| key.as_str() != "vnp_SecureHash") {
            let mut tampered = original.clone();
            tampered.insert(key.clone(), format!("{}x", original[key]));
            assert!(
                !service.verify_callback(&tampered),
                "mutation of {} must break the signature",
                key
            );
        }
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let service = test_service();
        let redirect = service.build_redirect_at(
            &Uuid::new_v4(),
            120_000,
            OrderKind::Purchase,
            "192.168.1.9",
            fixed_clock(),
            "0badcafe",
        );
        let mut params = params_of(&redirect);
        let mut sig = params["vnp_SecureHash"].clone();
        sig.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });
        params.insert("vnp_SecureHash".to_string(), sig);
        assert!(!service.verify_callback(&params));

        params.insert("vnp_SecureHash".to_string(), String::new());
        assert!(!service.verify_callback(&params));
    }

    #[test]
    fn test_canonical_query_sorts_and_form_encodes() {
        let pairs = vec![
            ("vnp_OrderInfo".to_string(), "thanh toan goi thue".to_string()),
            ("vnp_Amount".to_string(), "100".to_string()),
        ];
        let query = canonical_query(&pairs);
        assert_eq!(query, "vnp_Amount=100&vnp_OrderInfo=thanh+toan+goi+thue");

        let reversed: Vec<(String, String)> = pairs.into_iter().rev().collect();
        assert_eq!(query, canonical_query(&reversed));
    }

    #[test]
    fn test_secure_hash_type_is_ignored_when_verifying() {
        let service = test_service();
        let redirect = service.build_redirect_at(
            &Uuid::new_v4(),
            55_000,
            OrderKind::Purchase,
            "10.0.0.1",
            fixed_clock(),
            "0badcafe",
        );
        let mut params = params_of(&redirect);
        params.insert("vnp_SecureHashType".to_string(), "HMACSHA512".to_string());
        assert!(service.verify_callback(&params));
    }
}
