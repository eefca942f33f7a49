use uuid::Uuid;

pub const TICKET_ISSUED_TOPIC: &str = "tickets.issued";
pub const SEATS_CREATED_TOPIC: &str = "seats.created";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TicketIssuedEvent {
    pub ticket_id: Uuid,
    pub showtime_id: i64,
    pub seat_ids: Vec<i64>,
    pub price_cents: i64,
    pub issued_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatsCreatedEvent {
    pub showtime_ids: Vec<i64>,
    pub seat_count: usize,
    pub timestamp: i64,
}

impl TicketIssuedEvent {
    /// Partition key; keeps every event for one showtime in order.
    pub fn key(&self) -> String {
        self.showtime_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_issued_event_wire_shape() {
        let event = TicketIssuedEvent {
            ticket_id: Uuid::nil(),
            showtime_id: 7,
            seat_ids: vec![1, 2],
            price_cents: 3000,
            issued_at: 1_700_000_000,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["showtime_id"], 7);
        assert_eq!(value["seat_ids"], serde_json::json!([1, 2]));
        assert_eq!(event.key(), "7");
    }
}
