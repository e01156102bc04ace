//! The bootstrap capability: view info and session construction.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use gangway_types::{
    BoxFuture, BridgeApi, BridgeConfig, BridgeError, MainView, SandstormApi, Session,
    SessionContext, SessionRequest, ViewInfo,
};

use crate::mail::MailSink;
use crate::registry::SessionRegistry;
use crate::session::WebSessionImpl;

/// Maildir root for injected email.
pub const MAIL_ROOT: &str = "/var/mail";

/// Serves `getViewInfo` and `newSession` for the host.
pub struct MainViewImpl {
    port: u16,
    config: BridgeConfig,
    registry: Arc<SessionRegistry>,
    // Session ids are assigned sequentially and never reused.
    next_session_id: AtomicU64,
}

impl MainViewImpl {
    pub fn new(port: u16, config: BridgeConfig, registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(MainViewImpl {
            port,
            config,
            registry,
            next_session_id: AtomicU64::new(0),
        })
    }

    /// Granted permission names: the user's bits indexed into the package's
    /// declared permission list, comma-joined.
    fn format_permissions(&self, bits: &[bool]) -> String {
        let declared = &self.config.view_info.permissions;
        let mut names = Vec::new();
        for (index, permission) in declared.iter().enumerate() {
            if bits.get(index).copied().unwrap_or(false) {
                names.push(permission.name.as_str());
            }
        }
        names.join(",")
    }
}

/// Render a remote address for `X-Real-IP`: IPv4-mapped IPv6 addresses come
/// out as the dotted quad, everything else in its canonical text form.
pub fn format_remote_address(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}

impl MainView for MainViewImpl {
    fn get_view_info(&self) -> BoxFuture<'_, Result<ViewInfo, BridgeError>> {
        Box::pin(async move { Ok(self.config.view_info.clone()) })
    }

    fn new_session(
        &self,
        request: SessionRequest,
    ) -> BoxFuture<'_, Result<Session, BridgeError>> {
        Box::pin(async move {
            let session_id = self
                .next_session_id
                .fetch_add(1, Ordering::Relaxed)
                .to_string();
            info!(session_type = %request.session_type, session_id = %session_id, "new session");

            match request.session_type.as_str() {
                "web" => {
                    let params = request.params.web();
                    let session = WebSessionImpl::new(
                        self.port,
                        self.registry.clone(),
                        &request.user_info,
                        request.context,
                        session_id,
                        &request.tab_id,
                        params.base_path,
                        params.user_agent,
                        params.acceptable_languages.join(","),
                        "/".to_owned(),
                        self.format_permissions(&request.user_info.permissions),
                        None,
                    )?;
                    Ok(Session::Web(session))
                }
                "api" if !self.config.api_path.is_empty() => {
                    let params = request.params.api();
                    let session = WebSessionImpl::new(
                        self.port,
                        self.registry.clone(),
                        &request.user_info,
                        request.context,
                        session_id,
                        &request.tab_id,
                        String::new(),
                        String::new(),
                        String::new(),
                        self.config.api_path.clone(),
                        self.format_permissions(&request.user_info.permissions),
                        params.remote_address.map(format_remote_address),
                    )?;
                    Ok(Session::Web(session))
                }
                "email" => Ok(Session::Email(Arc::new(MailSink::new(MAIL_ROOT)))),
                other => Err(BridgeError::UnsupportedSessionType(other.to_owned())),
            }
        })
    }
}

/// The side-channel capability handed to the application.
pub struct BridgeApiImpl {
    api: Arc<dyn SandstormApi>,
    registry: Arc<SessionRegistry>,
}

impl BridgeApiImpl {
    pub fn new(api: Arc<dyn SandstormApi>, registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(BridgeApiImpl { api, registry })
    }
}

impl BridgeApi for BridgeApiImpl {
    fn get_sandstorm_api(&self) -> BoxFuture<'_, Result<Arc<dyn SandstormApi>, BridgeError>> {
        Box::pin(async move { Ok(self.api.clone()) })
    }

    fn get_session_context(
        &self,
        id: String,
    ) -> BoxFuture<'_, Result<Arc<dyn SessionContext>, BridgeError>> {
        Box::pin(async move { self.registry.get(&id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn remote_address_formats() {
        assert_eq!(
            format_remote_address(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))),
            "10.1.2.3"
        );
        assert_eq!(
            format_remote_address(IpAddr::V6(Ipv4Addr::new(192, 0, 2, 7).to_ipv6_mapped())),
            "192.0.2.7"
        );
        assert_eq!(
            format_remote_address(IpAddr::V6(Ipv6Addr::new(
                0x2001, 0xdb8, 0, 0, 0, 0, 0, 1
            ))),
            "2001:db8::1"
        );
    }
}
