// tests/router_integration.rs

//! End-to-end tests exercising `connection::route_inbound` the way a real
//! peer handshake would, against the in-memory `ChannelTransport` rather
//! than a real socket.

use reactor_supervisor::config::SupervisorConfig;
use reactor_supervisor::connection::{route_inbound, RouterContext};
use reactor_supervisor::core::facility::{FacilityState, Unit};
use reactor_supervisor::core::protocol::frame::{encode_frame, Frame, ProtocolTag};
use reactor_supervisor::core::protocol::rplc::{PlcRole, RplcMessage};
use reactor_supervisor::core::protocol::scada_mgmt::{EstablishRole, ScadaMgmtMessage};
use reactor_supervisor::core::protocol::Packet;
use reactor_supervisor::core::session::{SessionKindTag, SessionRegistry, COMMS_VERSION};
use reactor_supervisor::core::transport::channel::{ChannelNetwork, ChannelTransport};
use reactor_supervisor::core::transport::{DatagramTransport, Inbound};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

fn make_ctx() -> RouterContext {
    let units = vec![Unit::new(1, 1, 1)];
    let facility = FacilityState::new(1, units, 0, vec![0]);
    let network = ChannelNetwork::default();
    let transport = ChannelTransport::new(network, "127.0.0.1:16240".parse().unwrap());
    RouterContext {
        registry: Arc::new(SessionRegistry::new(COMMS_VERSION)),
        facility: Arc::new(Mutex::new(facility)),
        transport: Arc::new(transport) as Arc<dyn DatagramTransport>,
        config: Arc::new(SupervisorConfig::default()),
    }
}

fn plc_link_req_inbound(addr: SocketAddr, reactor_id: u32, version: u16) -> Inbound {
    let payload = reactor_supervisor::core::protocol::rplc::encode(&RplcMessage::LinkReq {
        version,
        reactor_id,
        role: PlcRole::Reactor,
    })
    .unwrap();
    let frame = Frame {
        src_channel: addr.port(),
        dst_channel: 16241,
        protocol: ProtocolTag::Rplc,
        seq: 0,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    Inbound {
        src_addr: addr,
        dst_channel: 16241,
        payload: encode_frame(&frame, None),
        distance: 0,
    }
}

fn establish_inbound(addr: SocketAddr, role: EstablishRole, version: u16) -> Inbound {
    let payload = reactor_supervisor::core::protocol::scada_mgmt::encode(&ScadaMgmtMessage::Establish { version, role }).unwrap();
    let frame = Frame {
        src_channel: addr.port(),
        dst_channel: 16243,
        protocol: ProtocolTag::ScadaMgmt,
        seq: 0,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    Inbound {
        src_addr: addr,
        dst_channel: 16243,
        payload: encode_frame(&frame, None),
        distance: 0,
    }
}

#[tokio::test]
async fn successful_plc_link_req_establishes_a_session_and_links_the_unit() {
    let ctx = make_ctx();
    let addr: SocketAddr = "127.0.0.1:20001".parse().unwrap();

    route_inbound(&ctx, plc_link_req_inbound(addr, 1, COMMS_VERSION)).await;

    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Plc).len(), 1);
    let facility = ctx.facility.lock().await;
    assert!(facility.unit(1).unwrap().plc_session.is_some());
}

/// spec.md §8 Testable Property 1.
#[tokio::test]
async fn second_link_req_for_an_already_linked_reactor_is_a_collision() {
    let ctx = make_ctx();
    let first_addr: SocketAddr = "127.0.0.1:20001".parse().unwrap();
    let second_addr: SocketAddr = "127.0.0.1:20002".parse().unwrap();

    route_inbound(&ctx, plc_link_req_inbound(first_addr, 1, COMMS_VERSION)).await;
    route_inbound(&ctx, plc_link_req_inbound(second_addr, 1, COMMS_VERSION)).await;

    // Only the first session survives; the colliding attempt never gets a
    // registry entry.
    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Plc).len(), 1);
}

#[tokio::test]
async fn link_req_with_wrong_comms_version_is_rejected() {
    let ctx = make_ctx();
    let addr: SocketAddr = "127.0.0.1:20001".parse().unwrap();

    route_inbound(&ctx, plc_link_req_inbound(addr, 1, COMMS_VERSION + 1)).await;

    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Plc).len(), 0);
}

#[tokio::test]
async fn establish_opens_a_coordinator_session() {
    let ctx = make_ctx();
    let addr: SocketAddr = "127.0.0.1:20003".parse().unwrap();

    route_inbound(&ctx, establish_inbound(addr, EstablishRole::Coord, COMMS_VERSION)).await;

    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Coord).len(), 1);
}

#[tokio::test]
async fn establish_opens_a_pocket_session() {
    let ctx = make_ctx();
    let addr: SocketAddr = "127.0.0.1:20004".parse().unwrap();

    route_inbound(&ctx, establish_inbound(addr, EstablishRole::Pocket, COMMS_VERSION)).await;

    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Pocket).len(), 1);
}

#[tokio::test]
async fn malformed_frame_bytes_are_dropped_without_opening_a_session() {
    let ctx = make_ctx();
    let inbound = Inbound {
        src_addr: "127.0.0.1:20005".parse().unwrap(),
        dst_channel: 16241,
        payload: vec![0xde, 0xad, 0xbe, 0xef],
        distance: 0,
    };

    route_inbound(&ctx, inbound).await;

    assert_eq!(ctx.registry.ids_by_kind(SessionKindTag::Plc).len(), 0);
}

/// An orphan packet shape (anything other than `LinkReq`/`Establish`) from
/// an address with no existing session never opens one.
#[tokio::test]
async fn orphan_coord_data_packet_from_unknown_peer_opens_no_session() {
    let ctx = make_ctx();
    let addr: SocketAddr = "127.0.0.1:20006".parse().unwrap();
    let payload = reactor_supervisor::core::protocol::coord_data::encode(&reactor_supervisor::core::protocol::coord_data::CoordDataMessage::FacCmd(
        reactor_supervisor::core::protocol::coord_data::FacilityCmd::Ack,
    ))
    .unwrap();
    let frame = Frame {
        src_channel: addr.port(),
        dst_channel: 16243,
        protocol: ProtocolTag::CoordData,
        seq: 0,
        timestamp_ms: now_ms(),
        payload,
        mac: None,
    };
    let inbound = Inbound {
        src_addr: addr,
        dst_channel: 16243,
        payload: encode_frame(&frame, None),
        distance: 0,
    };

    route_inbound(&ctx, inbound).await;

    assert_eq!(ctx.registry.len(), 0);
}

#[allow(dead_code)]
fn assert_packet_roundtrips(p: &Packet) {
    let _ = p;
}
