//! UDP market-data side channel.
//!
//! A read-only observer downstream of block application. A subscriber
//! announces itself with a datagram carrying an account instance id in
//! ASCII; from then on, every applied transaction that creates limit
//! orders triggers three publications to that subscriber:
//!
//! 1. the created orders,
//! 2. the affected order-book tops, and
//! 3. the subscriber's balances across a configured asset whitelist.
//!
//! Wire format is packed little-endian into a fixed 320-byte datagram:
//! one message-type byte (1 = orders, 2 = book, 3 = balances), then
//! type-specific fields. Publication must never block the chain: the send
//! socket is non-blocking and a full OS buffer simply drops the datagram.

mod wire;

pub use wire::{PackedWriter, MESSAGE_BALANCES, MESSAGE_BOOK, MESSAGE_ORDERS, PACKET_SIZE};

use lib_chain::observer::AppliedOperation;
use lib_chain::{ChainObserver, Database, Operation, SignedTransaction};
use lib_types::{AccountId, AssetId};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Assets whose balances are pushed to subscribers.
pub const DEFAULT_ASSET_WHITELIST: &[&str] =
    &["CORE", "USD", "CNY", "EUR", "BTC", "ETH", "GOLD", "SILVER"];

#[derive(Debug, Clone)]
pub struct MarketFeedConfig {
    /// Address the subscription socket binds to.
    pub bind_addr: String,
    /// Symbols whose balances are included in balance publications.
    pub asset_whitelist: Vec<String>,
    /// Book depth per side in book publications.
    pub book_depth: u32,
}

impl Default for MarketFeedConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:23232".into(),
            asset_whitelist: DEFAULT_ASSET_WHITELIST.iter().map(|s| s.to_string()).collect(),
            book_depth: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Subscriber {
    addr: SocketAddr,
    account: AccountId,
}

struct FeedState {
    socket: UdpSocket,
    subscriber: Mutex<Option<Subscriber>>,
    config: MarketFeedConfig,
}

/// The observer. Owns its socket and subscriber state; nothing here is
/// process-global, so several feeds can coexist in one process.
pub struct MarketFeed {
    state: Arc<FeedState>,
}

impl MarketFeed {
    /// Bind the socket and start the subscription listener thread.
    pub fn bind(config: MarketFeedConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(&config.bind_addr)?;
        let listener_socket = socket.try_clone()?;
        // publications must not stall the chain thread
        socket.set_nonblocking(true)?;

        let state = Arc::new(FeedState { socket, subscriber: Mutex::new(None), config });
        let listener_state = Arc::clone(&state);
        thread::Builder::new()
            .name("market-feed-listener".into())
            .spawn(move || listen_for_subscribers(listener_socket, listener_state))?;

        info!(addr = %state.config.bind_addr, "market feed initialized");
        Ok(Self { state })
    }

    fn subscriber(&self) -> Option<Subscriber> {
        *self.state.subscriber.lock()
    }

    fn send(&self, packet: &[u8; PACKET_SIZE], to: SocketAddr) {
        match self.state.socket.send_to(packet, to) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("send buffer full, dropping market datagram");
            }
            Err(e) => warn!(error = %e, "market feed send failed"),
        }
    }

    /// Orders created by the given operations, as one type-1 datagram.
    fn publish_limit_orders(&self, ops: &[Operation]) {
        let Some(subscriber) = self.subscriber() else { return };

        let created: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::LimitOrderCreate(create) => Some(create),
                _ => None,
            })
            .collect();
        let Some(first) = created.first() else { return };

        let mut writer = PackedWriter::new(MESSAGE_ORDERS);
        writer.put_u64(first.seller.0);
        writer.put_u32(created.len() as u32);
        for order in &created {
            writer.put_u32(order.amount_to_sell.asset_id.0 as u32);
            writer.put_i64(order.amount_to_sell.amount);
            writer.put_u32(order.min_to_receive.asset_id.0 as u32);
            writer.put_i64(order.min_to_receive.amount);
        }
        self.send(&writer.finish(), subscriber.addr);
    }

    /// Top of book for one market, as a type-2 datagram.
    fn publish_order_book(&self, db: &Database, base: AssetId, quote: AssetId) {
        let Some(subscriber) = self.subscriber() else { return };
        let book = match db.get_order_book(base, quote, self.state.config.book_depth) {
            Ok(book) => book,
            Err(e) => {
                warn!(error = %e, "order book query failed");
                return;
            }
        };

        let mut writer = PackedWriter::new(MESSAGE_BOOK);
        writer.put_str(&book.base);
        writer.put_str(&book.quote);
        writer.put_u32(book.bids.len() as u32);
        for order in &book.bids {
            writer.put_f64(order.price);
            writer.put_i64(order.base);
            writer.put_i64(order.quote);
        }
        writer.put_u32(book.asks.len() as u32);
        for order in &book.asks {
            writer.put_f64(order.price);
            writer.put_i64(order.base);
            writer.put_i64(order.quote);
        }
        self.send(&writer.finish(), subscriber.addr);
    }

    /// The subscriber's whitelisted balances, as a type-3 datagram.
    fn publish_balances(&self, db: &Database) {
        let Some(subscriber) = self.subscriber() else { return };
        let Some(account) = db.objects().find_account(subscriber.account) else {
            debug!(account = %subscriber.account, "subscribed account no longer exists");
            return;
        };

        let symbols: Vec<&str> =
            self.state.config.asset_whitelist.iter().map(|s| s.as_str()).collect();
        let assets = db.lookup_asset_symbols(&symbols);
        let present: Vec<_> = assets.iter().flatten().collect();

        let mut writer = PackedWriter::new(MESSAGE_BALANCES);
        writer.put_u32(present.len() as u32);
        for asset in present {
            writer.put_str(&asset.symbol);
            writer.put_i64(account.balance(asset.id));
        }
        self.send(&writer.finish(), subscriber.addr);
    }
}

impl ChainObserver for MarketFeed {
    fn pending_transaction(&self, _db: &Database, trx: &SignedTransaction) {
        self.publish_limit_orders(&trx.operations);
    }

    fn applied_block(
        &self,
        db: &Database,
        _block: &lib_chain::SignedBlock,
        applied_ops: &[Option<AppliedOperation>],
    ) {
        let mut markets: Vec<(AssetId, AssetId)> = Vec::new();
        let mut created: Vec<Operation> = Vec::new();
        for entry in applied_ops.iter().flatten() {
            if let Operation::LimitOrderCreate(op) = &entry.op {
                let market = op.market();
                if !markets.contains(&market) {
                    markets.push(market);
                }
                created.push(entry.op.clone());
            }
        }
        if markets.is_empty() {
            return;
        }

        self.publish_limit_orders(&created);
        for (base, quote) in markets {
            self.publish_order_book(db, base, quote);
        }
        self.publish_balances(db);
    }
}

fn listen_for_subscribers(socket: UdpSocket, state: Arc<FeedState>) {
    info!("market feed subscription listener running");
    let mut buffer = [0u8; 1024];
    loop {
        let (len, from) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "error reading subscription socket");
                continue;
            }
        };
        match parse_subscription(&buffer[..len]) {
            Some(account) => {
                let mut subscriber = state.subscriber.lock();
                *subscriber = Some(Subscriber { addr: from, account });
                info!(%from, %account, "market feed subscriber registered");
            }
            None => debug!(%from, "ignoring malformed subscription datagram"),
        }
    }
}

/// Subscription payload: the account instance id in ASCII digits.
fn parse_subscription(payload: &[u8]) -> Option<AccountId> {
    let text = std::str::from_utf8(payload).ok()?;
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok().map(AccountId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_parsing() {
        assert_eq!(parse_subscription(b"17"), Some(AccountId(17)));
        assert_eq!(parse_subscription(b"  42\n\0\0"), Some(AccountId(42)));
        assert_eq!(parse_subscription(b""), None);
        assert_eq!(parse_subscription(b"not-a-number"), None);
        assert_eq!(parse_subscription(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn bind_on_ephemeral_port() {
        let feed = MarketFeed::bind(MarketFeedConfig {
            bind_addr: "127.0.0.1:0".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(feed.subscriber().is_none());
    }
}
