use std::sync::Arc;

use roombook::domain::booking::BookingService;

#[derive(Clone)]
pub struct AppRegistry {
    booking_service: Arc<BookingService>,
}

impl AppRegistry {
    pub fn new(booking_service: BookingService) -> Self {
        Self {
            booking_service: Arc::new(booking_service),
        }
    }

    pub fn booking_service(&self) -> Arc<BookingService> {
        self.booking_service.clone()
    }
}
