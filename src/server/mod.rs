//! The Alpaca HTTP server: routing, the two-stage request pipeline and the
//! management API.

mod discovery;
pub use discovery::{BoundDiscoveryServer, DiscoveryServer, DEFAULT_DISCOVERY_PORT};

mod transaction;
pub(crate) use transaction::{RequestTransaction, ResponseTransaction, TransactionCounter};

mod case_insensitive_str;

mod params;
pub(crate) use params::ActionParams;

mod response;
pub(crate) use response::{OpaqueResponse, Response, ValueResponse};

mod error;
pub(crate) use error::Error;

mod dispatch;

use crate::api::{DeviceType, ImageArray, ImageBytesResponse, ServerInfo};
use crate::devices::TypedDevice;
use crate::{ASCOMResult, Devices};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::MethodFilter;
use axum::Router;
use std::future::{Future, IntoFuture};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::Instrument;

/// The Alpaca server.
#[derive(Debug)]
pub struct Server {
    /// Registered devices.
    pub devices: Devices,
    /// General server information.
    pub info: ServerInfo,
    /// Address for the HTTP server to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            devices: Devices::default(),
            info: ServerInfo::default(),
            listen_addr: (Ipv6Addr::UNSPECIFIED, 0).into(),
        }
    }
}

#[derive(Debug)]
struct ServerState {
    devices: Devices,
    info: ServerInfo,
    counter: TransactionCounter,
}

impl Server {
    /// Starts the Alpaca and discovery servers.
    ///
    /// The discovery responder is bound only after the HTTP server is bound
    /// successfully, since it advertises the bound port. Returns the bound
    /// HTTP address and the future driving both loops; the future resolves
    /// after `shutdown` is cancelled and in-flight requests have drained.
    pub async fn start(
        self,
        shutdown: CancellationToken,
    ) -> eyre::Result<(SocketAddr, impl Future<Output = eyre::Result<()>>)> {
        let addr = self.listen_addr;

        tracing::debug!(%addr, "Binding Alpaca server");

        // Dual-stack (IPv4+IPv6) listening on all platforms: this is what
        // users expect from an address like `[::]`, and what Linux does by
        // default but Windows does not. The standard TcpListener::bind can't
        // express it, so build the socket manually.
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        if addr.is_ipv6() {
            socket.set_only_v6(false)?;
        }
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;

        let listener = tokio::net::TcpListener::from_std(socket.into())?;
        let bound_addr = listener.local_addr()?;
        tracing::info!(%bound_addr, "Bound Alpaca server");

        let discovery = DiscoveryServer::for_alpaca_server_at(bound_addr)
            .bind()
            .await?;

        let http = axum::serve(listener, self.into_router().into_make_service())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());

        Ok((bound_addr, async move {
            let (http_result, ()) = tokio::join!(
                http.into_future().instrument(tracing::error_span!("alpaca_server_loop")),
                discovery.start(shutdown),
            );
            http_result?;
            Ok(())
        }))
    }

    /// Builds the HTTP router.
    ///
    /// Exposed separately so tests can drive the request pipeline without a
    /// socket.
    pub fn into_router(self) -> Router {
        let state = Arc::new(ServerState {
            devices: self.devices,
            info: self.info,
            counter: TransactionCounter::new(),
        });

        Router::new()
            .route(
                "/management/apiversions",
                axum::routing::get(
                    |State(state): State<Arc<ServerState>>, mut params: ActionParams| async move {
                        let transaction = begin_transaction(&state, &mut params);
                        Ok::<_, crate::ASCOMError>(OpaqueResponse::new([1_u32]))
                            .into_axum(transaction)
                    },
                ),
            )
            .route(
                "/management/v1/description",
                axum::routing::get(
                    |State(state): State<Arc<ServerState>>, mut params: ActionParams| async move {
                        let transaction = begin_transaction(&state, &mut params);
                        Ok::<_, crate::ASCOMError>(OpaqueResponse::new(ValueResponse {
                            value: &state.info,
                        }))
                        .into_axum(transaction)
                    },
                ),
            )
            .route(
                "/management/v1/configureddevices",
                axum::routing::get(
                    |State(state): State<Arc<ServerState>>, mut params: ActionParams| async move {
                        let transaction = begin_transaction(&state, &mut params);
                        let devices = state
                            .devices
                            .iter_all()
                            .map(|(device, number)| device.to_configured_device(number))
                            .collect::<Vec<_>>();
                        Ok::<_, crate::ASCOMError>(OpaqueResponse::new(devices))
                            .into_axum(transaction)
                    },
                ),
            )
            .route(
                "/api/v1/{device_type}/{device_number}/{action}",
                axum::routing::on(MethodFilter::GET.or(MethodFilter::PUT), device_request),
            )
            .layer(CatchPanicLayer::new())
            .with_state(state)
    }
}

fn begin_transaction(state: &ServerState, params: &mut ActionParams) -> ResponseTransaction {
    ResponseTransaction::new(&state.counter, RequestTransaction::extract(params))
}

/// Stage 1 of the pipeline: resolve the device identity, allocate the
/// transaction scaffold, then hand over to the typed dispatch of stage 2.
async fn device_request(
    State(state): State<Arc<ServerState>>,
    Path((device_type, device_number, action)): Path<(String, String, String)>,
    headers: HeaderMap,
    mut params: ActionParams,
) -> axum::response::Response {
    // The server transaction id is allocated exactly once per request,
    // before identity checks, so error paths consume ids too.
    let request_transaction = RequestTransaction::extract(&mut params);
    let transaction = ResponseTransaction::new(&state.counter, request_transaction);

    let span = tracing::error_span!(
        "handle_alpaca_request",
        device_type = %device_type,
        device_number = %device_number,
        action = %action,
        client_id = request_transaction.client_id,
        client_transaction_id = request_transaction.client_transaction_id,
        server_transaction_id = transaction.server_transaction_id,
    );

    async move {
        tracing::debug!(?params, "Received request");

        let Some(ty) = DeviceType::from_path(&device_type) else {
            return Error::UnsupportedDeviceType { ty: device_type }.into_response();
        };
        let Ok(number) = device_number.parse::<usize>() else {
            return Error::UnknownDeviceNumber {
                ty,
                number: device_number,
            }
            .into_response();
        };

        // `imagearray` negotiates the compact binary envelope via the Accept
        // header; everything else speaks JSON.
        if ty == DeviceType::Camera
            && matches!(params, ActionParams::Get(_))
            && matches!(action.as_str(), "imagearray" | "imagearrayvariant")
            && ImageArray::is_accepted(&headers)
        {
            return match state.devices.get(ty, number) {
                Some(TypedDevice::Camera(camera)) => {
                    let result: ASCOMResult<ImageBytesResponse> =
                        camera.image_array().await.map(ImageBytesResponse);
                    result.into_axum(transaction)
                }
                _ => Error::UnknownDeviceNumber {
                    ty,
                    number: device_number,
                }
                .into_response(),
            };
        }

        match dispatch::handle_action(&state.devices, ty, number, &action, params).await {
            Ok(result) => result.into_axum(transaction),
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}
