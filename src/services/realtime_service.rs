use tokio::sync::broadcast;
use uuid::Uuid;

/// Portée d'un abonnement: toutes les mutations de demandes, ou les
/// insertions de messages d'une seule demande.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeScope {
    WorkRequests,
    RequestMessages(Uuid),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    RequestChanged { request_id: Uuid },
    MessageInserted { request_id: Uuid, message_id: Uuid },
}

impl ChangeEvent {
    fn matches(&self, scope: &ChangeScope) -> bool {
        match (self, scope) {
            (ChangeEvent::RequestChanged { .. }, ChangeScope::WorkRequests) => true,
            (
                ChangeEvent::MessageInserted { request_id, .. },
                ChangeScope::RequestMessages(scoped_id),
            ) => request_id == scoped_id,
            _ => false,
        }
    }
}

/// Bus de notifications de changement. Les abonnés ne reçoivent pas de
/// delta: sur notification ils relancent leur dernière requête, ce qui
/// rend le modèle convergent quel que soit l'ordre ou la duplication
/// des notifications.
#[derive(Clone)]
pub struct RealtimeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl RealtimeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publie après commit. L'absence d'abonné n'est pas une erreur.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, scope: ChangeScope) -> Subscription {
        Subscription {
            scope,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RealtimeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Abonnement actif. Sa durée de vie est exactement celle de la vue qui
/// l'a créé: le drop libère la réception, sans fuite possible.
pub struct Subscription {
    scope: ChangeScope,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Prochain événement correspondant à la portée. Un retard de
    /// lecture (messages écrasés) est absorbé silencieusement: le
    /// modèle re-fetch-sur-notification tolère les pertes.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.matches(&self.scope) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_filters_events() {
        let bus = RealtimeBus::new();
        let request_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let mut sub = bus.subscribe(ChangeScope::RequestMessages(request_id));

        bus.publish(ChangeEvent::RequestChanged { request_id });
        bus.publish(ChangeEvent::MessageInserted {
            request_id: other_id,
            message_id: Uuid::new_v4(),
        });
        let expected = ChangeEvent::MessageInserted {
            request_id,
            message_id: Uuid::new_v4(),
        };
        bus.publish(expected.clone());

        assert_eq!(sub.next().await, Some(expected));
    }

    #[tokio::test]
    async fn test_global_scope_sees_all_request_changes() {
        let bus = RealtimeBus::new();
        let mut sub = bus.subscribe(ChangeScope::WorkRequests);

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        bus.publish(ChangeEvent::RequestChanged { request_id: first });
        bus.publish(ChangeEvent::RequestChanged { request_id: second });

        // L'ordre de livraison suit l'ordre de publication
        assert_eq!(
            sub.next().await,
            Some(ChangeEvent::RequestChanged { request_id: first })
        );
        assert_eq!(
            sub.next().await,
            Some(ChangeEvent::RequestChanged { request_id: second })
        );
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let bus = RealtimeBus::new();
        let sub = bus.subscribe(ChangeScope::WorkRequests);
        assert_eq!(bus.subscriber_count(), 1);
        sub.cancel();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = RealtimeBus::new();
        bus.publish(ChangeEvent::RequestChanged {
            request_id: Uuid::new_v4(),
        });
    }

    #[tokio::test]
    async fn test_duplicate_notifications_are_delivered_as_is() {
        // Les doublons sont acceptables: chaque notification déclenche un
        // re-fetch idempotent côté abonné.
        let bus = RealtimeBus::new();
        let request_id = Uuid::new_v4();
        let mut sub = bus.subscribe(ChangeScope::WorkRequests);

        bus.publish(ChangeEvent::RequestChanged { request_id });
        bus.publish(ChangeEvent::RequestChanged { request_id });

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_some());
    }
}
